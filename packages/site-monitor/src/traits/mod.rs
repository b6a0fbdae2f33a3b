//! Core trait abstractions at the external seams.

pub mod annotator;
pub mod fetcher;
pub mod notifier;
pub mod store;
