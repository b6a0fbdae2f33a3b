//! Annotator trait: opaque text → {category, summary} call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Structured annotation of a site's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub category: String,
    pub summary: String,
}

/// External AI annotator.
///
/// Invoked at most once per job per detected content change. Implementations
/// own their retry policy; the orchestrator bounds each call with a timeout.
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(&self, text: &str) -> Result<Annotation>;
}
