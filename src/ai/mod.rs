pub mod client;
pub mod delta;
pub mod extract;
mod prompts;
pub mod request;
pub mod sse;
mod types;

pub use client::GlmClient;
pub use request::build_request;
pub use types::{ApiResponse, ContentKind, StreamSink};
