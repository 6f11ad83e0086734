use anyhow::{Context, Result};
use residencias_llm::{ChatBackend, FunctionReply, LlmRequest};
use tracing::{debug, warn};

use crate::catalog::CATALOG;
use crate::intent::{Intent, IntentError};
use crate::parser::parse_question;

const ROUTING_PROMPT: &str = "You route questions about the spending of a network of residential \
care homes (providers, contracts, invoices) to exactly one of the available functions. Call the \
function that answers the question, passing dates as dd/mm/yyyy and years as numbers. If none \
applies, reply in plain text without calling a function.";

/// Turns a question into an intent. `Ok(None)` means the resolver has nothing to offer.
pub trait IntentResolver {
    fn name(&self) -> &'static str;
    fn resolve(&self, question: &str) -> Result<Option<Intent>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub intent: Intent,
    pub resolver: &'static str,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordResolver;

impl IntentResolver for KeywordResolver {
    fn name(&self) -> &'static str {
        "keywords"
    }

    fn resolve(&self, question: &str) -> Result<Option<Intent>> {
        Ok(parse_question(question))
    }
}

/// Offers the function catalog to a chat model and decodes its choice.
pub struct FunctionCallingResolver<'a> {
    chat: &'a dyn ChatBackend,
}

impl<'a> FunctionCallingResolver<'a> {
    pub fn new(chat: &'a dyn ChatBackend) -> Self {
        Self { chat }
    }
}

impl IntentResolver for FunctionCallingResolver<'_> {
    fn name(&self) -> &'static str {
        "function_calling"
    }

    fn resolve(&self, question: &str) -> Result<Option<Intent>> {
        let request = LlmRequest {
            system: Some(ROUTING_PROMPT.to_string()),
            user: question.trim().to_string(),
        };
        let reply = self
            .chat
            .select_function(&request, &CATALOG)
            .context("function-calling request failed")?;
        match reply {
            FunctionReply::Call { name, arguments } => match Intent::from_call(&name, &arguments) {
                Ok(intent) => Ok(Some(intent)),
                Err(IntentError::UnknownFunction(name)) => {
                    debug!(function = %name, "model chose an unknown function");
                    Ok(None)
                }
                Err(err) => {
                    warn!(error = %err, "discarding function call");
                    Ok(None)
                }
            },
            FunctionReply::Text(text) => {
                debug!(reply = %text, "model did not select a function");
                Ok(None)
            }
        }
    }
}

/// Tries each resolver in order; the first intent wins and errors stop the chain.
#[derive(Default)]
pub struct ResolverChain<'a> {
    resolvers: Vec<Box<dyn IntentResolver + 'a>>,
}

impl<'a> ResolverChain<'a> {
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    pub fn keywords_only() -> Self {
        Self::new().with(KeywordResolver)
    }

    pub fn with(mut self, resolver: impl IntentResolver + 'a) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn resolve(&self, question: &str) -> Result<Option<Resolved>> {
        for resolver in &self.resolvers {
            if let Some(intent) = resolver.resolve(question)? {
                debug!(resolver = resolver.name(), intent = intent.name(), "question resolved");
                return Ok(Some(Resolved {
                    intent,
                    resolver: resolver.name(),
                }));
            }
        }
        Ok(None)
    }
}
