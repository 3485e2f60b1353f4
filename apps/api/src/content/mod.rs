pub mod handlers;
pub mod pdf;
pub mod prompts;
pub mod suggestions;
pub mod templates;
