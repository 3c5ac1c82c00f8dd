use serde::Serialize;

/// Row of the seen_listings table. Used by sqlx for typed queries and
/// serialized as-is by the results endpoint.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SeenListingRow {
    pub keyword_id: String,
    pub listing_id: String,
    pub title: String,
    pub price: String,
    pub url: String,
    pub image_url: Option<String>,
    pub posted_at: Option<String>,
    pub first_seen_at: String,
}
