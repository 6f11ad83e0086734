use residencias_core::report::{Report, UNRECOGNIZED};
use residencias_core::{Dataset, TableBackend};
use residencias_llm::{ChatBackend, LlmRequest, CONTEXT_END, CONTEXT_START};
use serde::Serialize;
use tracing::{debug, warn};

use crate::dispatch::dispatch;
use crate::intent::Intent;
use crate::resolver::ResolverChain;

const PHRASING_PROMPT: &str = "You are an assistant for a network of residential care homes. \
Answer the question using only the information in CONTEXT. Keep every amount, date and name \
exactly as written there.";

/// How the raw report text reaches the user.
pub enum Phrasing<'a> {
    Raw,
    /// Phrasing was requested but no API key is configured.
    MissingCredential,
    Model(&'a dyn ChatBackend),
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub intent: Option<Intent>,
    pub resolver: Option<&'static str>,
    pub report: Report,
    /// What gets shown: the phrased reply, the raw report, or an `(ERROR)` line carrying it.
    pub text: String,
}

pub struct QueryPipeline<'a> {
    tables: &'a dyn TableBackend,
    resolvers: ResolverChain<'a>,
    phrasing: Phrasing<'a>,
}

impl<'a> QueryPipeline<'a> {
    pub fn new(
        tables: &'a dyn TableBackend,
        resolvers: ResolverChain<'a>,
        phrasing: Phrasing<'a>,
    ) -> Self {
        Self {
            tables,
            resolvers,
            phrasing,
        }
    }

    /// resolve → load → dispatch → phrase. Every failure ends up as text in the answer.
    pub fn ask(&self, question: &str) -> Answer {
        let resolved = match self.resolvers.resolve(question) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "intent resolution failed");
                return Answer {
                    question: question.to_string(),
                    intent: None,
                    resolver: None,
                    report: Report::unrecognized(),
                    text: format!("(ERROR) {err:#}. CONTEXT: {UNRECOGNIZED}"),
                };
            }
        };
        let (intent, resolver, report) = match resolved {
            Some(resolved) => {
                let ds = Dataset::load(self.tables);
                let report = dispatch(&resolved.intent, &ds);
                (Some(resolved.intent), Some(resolved.resolver), report)
            }
            None => (None, None, Report::unrecognized()),
        };
        debug!(kind = report.kind.as_str(), "report ready");
        let text = self.phrase(question, &report.text);
        Answer {
            question: question.to_string(),
            intent,
            resolver,
            report,
            text,
        }
    }

    fn phrase(&self, question: &str, raw: &str) -> String {
        match self.phrasing {
            Phrasing::Raw => raw.to_string(),
            Phrasing::MissingCredential => format!("(ERROR) Missing LLM API key. CONTEXT: {raw}"),
            Phrasing::Model(chat) => {
                let request = LlmRequest {
                    system: Some(PHRASING_PROMPT.to_string()),
                    user: format!(
                        "{CONTEXT_START}\n{raw}\n{CONTEXT_END}\n\nQuestion: {}\nAnswer:",
                        question.trim()
                    ),
                };
                match chat.complete(&request) {
                    Ok(response) => {
                        debug!(
                            prompt_tokens = response.prompt_tokens,
                            completion_tokens = response.completion_tokens,
                            "answer phrased"
                        );
                        response.content.trim().to_string()
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "phrasing failed");
                        format!("(ERROR) {err:#}. CONTEXT: {raw}")
                    }
                }
            }
        }
    }
}
