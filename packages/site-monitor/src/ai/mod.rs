//! Annotator implementations.
//!
//! - `OpenAiAnnotator` - chat-completions backed category and summary
//! - `OfflineAnnotator` - deterministic heuristic used when no API key is set

mod offline;
mod openai;

pub use offline::OfflineAnnotator;
pub use openai::{parse_annotation, OpenAiAnnotator, OpenAiConfig};
