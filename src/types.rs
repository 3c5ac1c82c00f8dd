use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Keyword
// ---------------------------------------------------------------------------

/// A user-defined search filter, evaluated periodically by the scheduler.
/// The id is the normalized term; the original casing is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub id: String,
    pub term: String,
    pub interval_minutes: u32,
    /// Price bounds in whole euros. Listings are filtered in cents.
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// Max candidates considered per run, 1..=20.
    pub result_limit: usize,
    /// Per-keyword night-mode override: None follows the global setting,
    /// Some(false) opts this keyword out of night throttling.
    #[serde(default)]
    pub night_mode: Option<bool>,
}

/// Normalize a search term into a stable keyword id: trimmed, lowercased,
/// inner whitespace collapsed to single spaces.
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Candidate: one listing returned by a search run, pre-dedup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub listing_id: String,
    pub title: String,
    /// Parsed price in cents; None when the listing has no parseable price
    /// ("bieden", "gratis", ...).
    pub price_cents: Option<i64>,
    /// Price as shown by the marketplace, for notifications and the API.
    pub price_display: String,
    pub image_url: Option<String>,
    pub detail_url: String,
    /// Raw posted-at string from the marketplace, best effort.
    pub posted_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    Scheduled,
    Manual,
}

impl std::fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggeredBy::Scheduled => write!(f, "scheduled"),
            TriggeredBy::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Fetched candidates and dispatched; advances last_run.
    Success,
    /// Fetch returned nothing; still advances last_run.
    Empty,
    /// Collaborator failure; last_run unchanged so the next tick retries.
    FetchError,
    /// Persistence failure; run aborted, last_run unchanged.
    StoreError,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::Empty => write!(f, "empty"),
            RunOutcome::FetchError => write!(f, "fetch_error"),
            RunOutcome::StoreError => write!(f, "store_error"),
        }
    }
}

/// One completed run of fetch → filter → dedup → notify for a keyword.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub keyword_id: String,
    pub triggered_by: TriggeredBy,
    pub started_at: NaiveDateTime,
    pub outcome: RunOutcome,
    /// Candidates remaining after price filtering and truncation.
    pub fetched: usize,
    /// Candidates stored and handed to the notifier.
    pub new: usize,
}
