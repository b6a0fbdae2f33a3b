//! Live progress of running attempts.

use dashmap::DashMap;

use crate::types::job::{JobId, JobStatus, Progress};

/// Progress is capped here until the artifact is persisted.
pub const MAX_RUNNING_PERCENT: u8 = 99;

/// Percentage for `visited` fetches out of a `max_pages` budget.
pub fn crawl_percentage(visited: usize, max_pages: usize) -> u8 {
    if max_pages == 0 {
        return 0;
    }
    let percent = visited.saturating_mul(100) / max_pages;
    percent.min(MAX_RUNNING_PERCENT as usize) as u8
}

/// In-memory progress for attempts that have not been committed yet.
#[derive(Default)]
pub struct ProgressTable {
    entries: DashMap<JobId, Progress>,
}

impl ProgressTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, id: JobId, message: impl Into<String>) {
        self.entries.insert(
            id,
            Progress {
                percentage: 0,
                message: message.into(),
                status: JobStatus::InProgress,
            },
        );
    }

    /// Raise progress. Lower percentages keep the current value; the
    /// message is always replaced.
    pub fn update(&self, id: JobId, percentage: u8, message: impl Into<String>) {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.percentage = entry.percentage.max(percentage.min(MAX_RUNNING_PERCENT));
            entry.message = message.into();
        }
    }

    pub fn get(&self, id: JobId) -> Option<Progress> {
        self.entries.get(&id).map(|p| p.clone())
    }

    pub fn finish(&self, id: JobId) {
        self.entries.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_percentage_saturates_below_complete() {
        assert_eq!(crawl_percentage(0, 20), 0);
        assert_eq!(crawl_percentage(5, 20), 25);
        assert_eq!(crawl_percentage(20, 20), 99);
        assert_eq!(crawl_percentage(30, 20), 99);
        assert_eq!(crawl_percentage(3, 0), 0);
    }

    #[test]
    fn test_updates_never_regress() {
        let table = ProgressTable::new();
        let id = JobId::new();
        table.start(id, "Starting crawler");
        table.update(id, 40, "Crawled 8/20 pages");
        table.update(id, 10, "Crawled 9/20 pages");
        table.update(id, 100, "Generating summary");

        let progress = table.get(id).unwrap();
        assert_eq!(progress.percentage, 99);
        assert_eq!(progress.message, "Generating summary");

        table.finish(id);
        assert!(table.get(id).is_none());
    }
}
