pub mod channel;
pub mod json_extract;
pub mod prompts;

pub use channel::{HttpSuggestionChannel, LlmConfig, LlmError, LlmProvider, SuggestionChannel};
