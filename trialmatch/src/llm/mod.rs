mod prompts;
mod provider;

pub use prompts::build_prompt;
pub use provider::{Explanation, ExplanationProvider, RuleContext};
