pub mod client;
pub mod models;

pub use client::LlmClient;
pub use models::{ClassificationResult, LlmError};
