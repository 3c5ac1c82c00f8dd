use std::collections::VecDeque;
use std::sync::Mutex;

use crate::types::RunRecord;

/// Bounded in-memory log of recent run records, newest first on read.
/// Feeds the /runs endpoint; the durable record of a run is its tracing line.
pub struct RunLog {
    entries: Mutex<VecDeque<RunRecord>>,
    capacity: usize,
}

impl RunLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, record: RunRecord) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    pub fn recent(&self, limit: usize) -> Vec<RunRecord> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RunRecord>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunOutcome, TriggeredBy};
    use chrono::NaiveDate;

    fn record(n: u32) -> RunRecord {
        RunRecord {
            keyword_id: format!("kw{n}"),
            triggered_by: TriggeredBy::Scheduled,
            started_at: NaiveDate::from_ymd_opt(2024, 6, 10)
                .unwrap()
                .and_hms_opt(12, n, 0)
                .unwrap(),
            outcome: RunOutcome::Success,
            fetched: 3,
            new: 1,
        }
    }

    #[test]
    fn recent_returns_newest_first() {
        let log = RunLog::new(8);
        for n in 0..3 {
            log.push(record(n));
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].keyword_id, "kw2");
        assert_eq!(recent[2].keyword_id, "kw0");
    }

    #[test]
    fn capacity_evicts_oldest() {
        let log = RunLog::new(2);
        for n in 0..5 {
            log.push(record(n));
        }
        assert_eq!(log.len(), 2);
        let recent = log.recent(10);
        assert_eq!(recent[0].keyword_id, "kw4");
        assert_eq!(recent[1].keyword_id, "kw3");
    }
}
