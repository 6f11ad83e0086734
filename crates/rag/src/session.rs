use residencias_core::ReportKind;
use serde::Serialize;

use crate::pipeline::Answer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub question: String,
    pub intent: Option<&'static str>,
    pub kind: ReportKind,
    pub answer: String,
}

/// Append-only history of one interactive conversation.
#[derive(Debug, Default)]
pub struct Session {
    turns: Vec<Turn>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, answer: &Answer) -> &Turn {
        self.turns.push(Turn {
            question: answer.question.clone(),
            intent: answer.intent.as_ref().map(|intent| intent.name()),
            kind: answer.report.kind,
            answer: answer.text.clone(),
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for (idx, turn) in self.turns.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {} ({})\n{}\n\n",
                idx + 1,
                turn.question,
                turn.intent.unwrap_or("unrecognized"),
                turn.answer
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use residencias_core::Report;

    fn answer(question: &str, intent: Option<Intent>, report: Report) -> Answer {
        Answer {
            question: question.to_string(),
            intent,
            resolver: None,
            text: report.text.clone(),
            report,
        }
    }

    #[test]
    fn records_turns_in_order() {
        let mut session = Session::new();
        assert!(session.is_empty());
        session.record(&answer(
            "total 2024",
            Some(Intent::TotalForYear { year: Some(2024) }),
            Report::answer("Total spend in 2024 is 10.00."),
        ));
        let turn = session.record(&answer("hola", None, Report::unrecognized()));
        assert_eq!(turn.kind, ReportKind::Unrecognized);
        assert_eq!(session.len(), 2);
        assert_eq!(session.turns()[0].intent, Some("total_for_year"));
        let transcript = session.transcript();
        assert!(transcript.starts_with("[1] total 2024 (total_for_year)"));
        assert!(transcript.contains("[2] hola (unrecognized)"));
    }
}
