use std::sync::Arc;

use dashmap::DashMap;

use crate::config::RESULT_LIMIT_MAX;
use crate::error::{AppError, Result};
use crate::types::Keyword;

/// In-memory view of the configured keywords, shared between the HTTP
/// interface (writes) and the scheduler (snapshot reads). The scheduler never
/// holds references into the map across a run; it works on per-tick copies,
/// so edits apply to the next run and deletions to the next tick.
pub struct KeywordRegistry {
    keywords: DashMap<String, Keyword>,
}

impl KeywordRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            keywords: DashMap::new(),
        })
    }

    /// Immutable copy of all keywords, ordered by id for stable iteration.
    pub fn snapshot(&self) -> Vec<Keyword> {
        let mut all: Vec<Keyword> = self.keywords.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn get(&self, id: &str) -> Option<Keyword> {
        self.keywords.get(id).map(|e| e.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keywords.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    /// Insert or replace a keyword after validating it. Inconsistent updates
    /// are rejected at this boundary, never clamped.
    pub fn upsert(&self, keyword: Keyword) -> Result<Keyword> {
        validate(&keyword)?;
        self.keywords.insert(keyword.id.clone(), keyword.clone());
        Ok(keyword)
    }

    /// Remove a keyword; returns the removed entry if it existed. An in-flight
    /// run for it completes, but the next scheduler tick no longer sees it.
    pub fn remove(&self, id: &str) -> Option<Keyword> {
        self.keywords.remove(id).map(|(_, kw)| kw)
    }
}

fn validate(keyword: &Keyword) -> Result<()> {
    if keyword.term.trim().is_empty() {
        return Err(AppError::InvalidKeyword("term must not be empty".to_string()));
    }
    if keyword.interval_minutes == 0 {
        return Err(AppError::InvalidKeyword(
            "interval_minutes must be at least 1".to_string(),
        ));
    }
    if keyword.result_limit < 1 || keyword.result_limit > RESULT_LIMIT_MAX {
        return Err(AppError::InvalidKeyword(format!(
            "result_limit must be in 1..={RESULT_LIMIT_MAX}"
        )));
    }
    if let (Some(min), Some(max)) = (keyword.min_price, keyword.max_price) {
        if min > max {
            return Err(AppError::InvalidKeyword(format!(
                "min_price {min} exceeds max_price {max}"
            )));
        }
    }
    if keyword.min_price.is_some_and(|p| p < 0) || keyword.max_price.is_some_and(|p| p < 0) {
        return Err(AppError::InvalidKeyword("prices must not be negative".to_string()));
    }
    Ok(())
}
