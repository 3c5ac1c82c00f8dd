use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::SeenListingRow;
use crate::error::Result;
use crate::types::Candidate;

/// Persisted set of previously-seen listing identifiers, keyed by keyword.
/// (keyword_id, listing_id) pairs are append-only; a per-keyword reset is the
/// only way rows are removed. Concurrent runs for different keywords share
/// the pool freely; per-keyword exclusivity is the scheduler's job.
#[derive(Clone)]
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a candidate for a keyword if it was never seen before.
    /// Returns true when the row is new. The insert happens before any
    /// notification is attempted, so a crash can never cause a duplicate
    /// report; at worst one notification is lost.
    pub async fn insert_if_new(
        &self,
        keyword_id: &str,
        candidate: &Candidate,
        first_seen_at: NaiveDateTime,
    ) -> Result<bool> {
        let first_seen = first_seen_at.format("%Y-%m-%dT%H:%M:%S").to_string();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO seen_listings
                (keyword_id, listing_id, title, price, url, image_url, posted_at, first_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(keyword_id)
        .bind(&candidate.listing_id)
        .bind(&candidate.title)
        .bind(&candidate.price_display)
        .bind(&candidate.detail_url)
        .bind(&candidate.image_url)
        .bind(&candidate.posted_at)
        .bind(first_seen)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_seen(&self, keyword_id: &str, listing_id: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM seen_listings WHERE keyword_id = ? AND listing_id = ?",
        )
        .bind(keyword_id)
        .bind(listing_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn seen_count(&self, keyword_id: &str) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM seen_listings WHERE keyword_id = ?")
                .bind(keyword_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Stored listings for one keyword, newest first.
    pub async fn results_for_keyword(
        &self,
        keyword_id: &str,
        limit: i64,
    ) -> Result<Vec<SeenListingRow>> {
        let rows = sqlx::query_as::<_, SeenListingRow>(
            r#"
            SELECT keyword_id, listing_id, title, price, url, image_url, posted_at, first_seen_at
            FROM seen_listings
            WHERE keyword_id = ?
            ORDER BY first_seen_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(keyword_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Forget everything seen for a keyword. The next run treats all current
    /// candidates as new. Explicit user action only.
    pub async fn reset_keyword(&self, keyword_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM seen_listings WHERE keyword_id = ?")
            .bind(keyword_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// One connection only: every pooled connection to "sqlite::memory:" gets
/// its own private database, so the migrated schema must stay pinned to a
/// single one.
#[cfg(test)]
pub async fn test_store() -> ResultStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    ResultStore::new(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str) -> Candidate {
        Candidate {
            listing_id: id.to_string(),
            title: format!("listing {id}"),
            price_cents: Some(6000),
            price_display: "€ 60,00".to_string(),
            image_url: None,
            detail_url: format!("https://example.test/v/{id}"),
            posted_at: None,
        }
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn insert_reports_new_only_once() {
        let store = test_store().await;
        assert!(store.insert_if_new("bike", &candidate("a"), now()).await.unwrap());
        assert!(!store.insert_if_new("bike", &candidate("a"), now()).await.unwrap());
        assert!(store.is_seen("bike", "a").await.unwrap());
        assert_eq!(store.seen_count("bike").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_listing_under_different_keywords_is_independent() {
        let store = test_store().await;
        assert!(store.insert_if_new("bike", &candidate("a"), now()).await.unwrap());
        assert!(store.insert_if_new("lego", &candidate("a"), now()).await.unwrap());
        assert!(!store.is_seen("chair", "a").await.unwrap());
    }

    #[tokio::test]
    async fn reset_clears_only_that_keyword() {
        let store = test_store().await;
        store.insert_if_new("bike", &candidate("a"), now()).await.unwrap();
        store.insert_if_new("bike", &candidate("b"), now()).await.unwrap();
        store.insert_if_new("lego", &candidate("a"), now()).await.unwrap();

        assert_eq!(store.reset_keyword("bike").await.unwrap(), 2);
        assert_eq!(store.seen_count("bike").await.unwrap(), 0);
        assert_eq!(store.seen_count("lego").await.unwrap(), 1);

        // After a reset the same listing is reported as new again.
        assert!(store.insert_if_new("bike", &candidate("a"), now()).await.unwrap());
    }

    #[tokio::test]
    async fn results_are_newest_first() {
        let store = test_store().await;
        let t0 = now();
        store.insert_if_new("bike", &candidate("a"), t0).await.unwrap();
        store
            .insert_if_new("bike", &candidate("b"), t0 + chrono::Duration::minutes(5))
            .await
            .unwrap();

        let rows = store.results_for_keyword("bike", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].listing_id, "b");
        assert_eq!(rows[1].listing_id, "a");
    }
}
