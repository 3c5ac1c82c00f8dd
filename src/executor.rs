use std::sync::Arc;

use crate::error::Result;
use crate::fetcher::{ListingSource, SearchQuery};
use crate::types::{Candidate, Keyword};

/// Runs one search for a keyword: fetch via the listing source, re-apply the
/// price bounds, truncate to the keyword's result limit. Source ordering
/// (most recent first) is preserved throughout.
pub struct SearchExecutor {
    source: Arc<dyn ListingSource>,
    postcode: Option<String>,
    radius_km: Option<u32>,
}

impl SearchExecutor {
    pub fn new(
        source: Arc<dyn ListingSource>,
        postcode: Option<String>,
        radius_km: Option<u32>,
    ) -> Self {
        Self {
            source,
            postcode,
            radius_km,
        }
    }

    pub async fn execute(&self, keyword: &Keyword) -> Result<Vec<Candidate>> {
        let query = SearchQuery {
            term: keyword.term.clone(),
            min_price: keyword.min_price,
            max_price: keyword.max_price,
            postcode: self.postcode.clone(),
            radius_km: self.radius_km,
            limit: keyword.result_limit,
        };

        let raw = self.source.fetch(&query).await?;

        // The source is asked to honor the bounds, but is not trusted to.
        let candidates: Vec<Candidate> = raw
            .into_iter()
            .filter(|c| within_bounds(c, keyword.min_price, keyword.max_price))
            .take(keyword.result_limit)
            .collect();

        Ok(candidates)
    }
}

/// Bounds are in whole euros, candidate prices in cents. A candidate without
/// a parseable price fails any configured bound.
fn within_bounds(candidate: &Candidate, min_price: Option<i64>, max_price: Option<i64>) -> bool {
    if min_price.is_none() && max_price.is_none() {
        return true;
    }
    let Some(cents) = candidate.price_cents else {
        return false;
    };
    if min_price.is_some_and(|min| cents < min * 100) {
        return false;
    }
    if max_price.is_some_and(|max| cents > max * 100) {
        return false;
    }
    true
}


#[cfg(test)]
mod tests {
    use super::testing::{candidate, ScriptedSource};
    use super::*;
    use crate::types::normalize_term;

    fn keyword(min: Option<i64>, max: Option<i64>, limit: usize) -> Keyword {
        Keyword {
            id: normalize_term("bike"),
            term: "bike".to_string(),
            interval_minutes: 30,
            min_price: min,
            max_price: max,
            result_limit: limit,
            night_mode: None,
        }
    }

    #[tokio::test]
    async fn filters_candidates_outside_price_bounds() {
        let source = ScriptedSource::always(vec![
            candidate("a", Some(60)),
            candidate("b", Some(200)),
            candidate("c", Some(90)),
        ]);
        let executor = SearchExecutor::new(source, None, None);

        let result = executor.execute(&keyword(Some(50), Some(150), 5)).await.unwrap();
        let ids: Vec<&str> = result.iter().map(|c| c.listing_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn unpriced_candidates_fail_configured_bounds_only() {
        let source = ScriptedSource::always(vec![candidate("bid", None), candidate("a", Some(60))]);

        let executor = SearchExecutor::new(source.clone(), None, None);
        let bounded = executor.execute(&keyword(Some(50), None, 5)).await.unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].listing_id, "a");

        let unbounded = executor.execute(&keyword(None, None, 5)).await.unwrap();
        assert_eq!(unbounded.len(), 2);
    }

    #[tokio::test]
    async fn truncates_after_filtering_preserving_order() {
        let source = ScriptedSource::always(vec![
            candidate("a", Some(60)),
            candidate("b", Some(500)),
            candidate("c", Some(70)),
            candidate("d", Some(80)),
            candidate("e", Some(90)),
        ]);
        let executor = SearchExecutor::new(source, None, None);

        let result = executor.execute(&keyword(None, Some(100), 2)).await.unwrap();
        let ids: Vec<&str> = result.iter().map(|c| c.listing_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn source_failure_propagates() {
        let executor = SearchExecutor::new(ScriptedSource::failing(), None, None);
        assert!(executor.execute(&keyword(None, None, 5)).await.is_err());
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(within_bounds(&candidate("a", Some(50)), Some(50), Some(150)));
        assert!(within_bounds(&candidate("a", Some(150)), Some(50), Some(150)));
        assert!(!within_bounds(&candidate("a", Some(49)), Some(50), Some(150)));
        assert!(!within_bounds(&candidate("a", Some(151)), Some(50), Some(150)));
    }
}
