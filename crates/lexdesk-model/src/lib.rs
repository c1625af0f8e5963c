pub mod claude;
pub mod gemini;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
