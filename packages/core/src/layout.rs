//! Broker key layout.

use crate::job::JobId;

/// Names of the shared broker structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLayout {
    /// Work queue list: tail push, exclusive blocking pop from the head.
    pub work_queue: String,
    /// Dead-letter list: head push, most recent failure first.
    pub dead_letter: String,
    /// Capped list of the newest job ids.
    pub recent: String,
    /// Maximum length of the recent index.
    pub recent_cap: usize,
    /// Broadcast channel for transition events.
    pub events_channel: String,
    /// Prefix of the per-job mirror hash key.
    pub mirror_prefix: String,
}

impl Default for QueueLayout {
    fn default() -> Self {
        Self {
            work_queue: "jobs:queue".to_string(),
            dead_letter: "jobs:dead".to_string(),
            recent: "jobs:recent".to_string(),
            recent_cap: 50,
            events_channel: "jobs:events".to_string(),
            mirror_prefix: "job:".to_string(),
        }
    }
}

impl QueueLayout {
    /// Set the recent index cap. A cap of zero is raised to one.
    pub fn with_recent_cap(mut self, cap: usize) -> Self {
        self.recent_cap = cap.max(1);
        self
    }

    /// Broker key of a job's mirror hash.
    pub fn mirror_key(&self, id: &JobId) -> String {
        format!("{}{}", self.mirror_prefix, id)
    }
}
