//! Domain types: jobs, pages, crawl outcomes, configuration.

pub mod config;
pub mod job;
pub mod page;
pub mod status;
