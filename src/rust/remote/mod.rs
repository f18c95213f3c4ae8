//! Remote text and vision services reached over OpenAI-compatible HTTP APIs.

mod client;
mod error;
pub mod prompt;

pub use client::{ChatCompletionsClient, GenerationRequest, ImageAttachment, TextGenerator};
pub use error::RemoteServiceError;
