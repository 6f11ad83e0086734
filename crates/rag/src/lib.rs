pub mod catalog;
pub mod dispatch;
pub mod intent;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod session;

pub use catalog::CATALOG;
pub use dispatch::{dispatch, dispatch_named};
pub use intent::{Intent, IntentError, INTENT_NAMES};
pub use parser::{extract, parse_question, Extracted};
pub use pipeline::{Answer, Phrasing, QueryPipeline};
pub use resolver::{
    FunctionCallingResolver, IntentResolver, KeywordResolver, Resolved, ResolverChain,
};
pub use residencias_llm::{
    ChatBackend, FunctionReply, FunctionSpec, LlmClient, LlmProvider, LlmRequest, LlmResponse,
};
pub use session::{Session, Turn};
