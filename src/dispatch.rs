use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::db::ResultStore;
use crate::error::Result;
use crate::notifier::Notifier;
use crate::types::{Candidate, Keyword};

/// Diffs a run's candidates against the result store and forwards the
/// genuinely new ones to the notifier.
///
/// Each identifier is stored durably before its notification is attempted:
/// a crash between the two can drop one notification, never duplicate one.
/// Do not reorder this without revisiting that trade-off.
pub struct DispatchCoordinator {
    store: ResultStore,
    notifier: Arc<dyn Notifier>,
}

impl DispatchCoordinator {
    pub fn new(store: ResultStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Returns the candidates reported for the first time, in source order.
    /// A store error aborts the run; a notify error is logged per item and
    /// delivery continues with the next one.
    pub async fn dispatch(
        &self,
        keyword: &Keyword,
        candidates: &[Candidate],
        now: NaiveDateTime,
    ) -> Result<Vec<Candidate>> {
        let mut newly_reported = Vec::new();
        for candidate in candidates {
            if self.store.insert_if_new(&keyword.id, candidate, now).await? {
                newly_reported.push(candidate.clone());
            }
        }

        for candidate in &newly_reported {
            if let Err(e) = self.notifier.notify(candidate).await {
                warn!(
                    keyword = %keyword.id,
                    listing = %candidate.listing_id,
                    "notification failed: {e}"
                );
            }
        }

        Ok(newly_reported)
    }
}
