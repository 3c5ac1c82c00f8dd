use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::FETCH_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::Candidate;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// One search request as handed to the listing source. Price bounds are
/// forwarded for the source's benefit only; the executor re-filters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub term: String,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub postcode: Option<String>,
    pub radius_km: Option<u32>,
    pub limit: usize,
}

/// External listing retrieval. All failures are transient from the engine's
/// point of view: the run records fetch_error and the next tick retries.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<Candidate>>;
}

// ---------------------------------------------------------------------------
// Marktplaats search API client
// ---------------------------------------------------------------------------

pub struct MarktplaatsClient {
    client: reqwest::Client,
    base_url: String,
}

impl MarktplaatsClient {
    pub fn new(base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ListingSource for MarktplaatsClient {
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<Candidate>> {
        let url = format!("{}/lrp/api/search", self.base_url);

        let limit = query.limit.to_string();
        let mut params: Vec<(&str, String)> = vec![
            ("query", query.term.clone()),
            ("sortBy", "SORT_INDEX".to_string()),
            ("sortOrder", "DECREASING".to_string()),
            ("viewOptions", "list-view".to_string()),
            ("limit", limit),
            ("offset", "0".to_string()),
        ];
        if let Some(postcode) = &query.postcode {
            params.push(("postcode", postcode.clone()));
        }
        if let Some(radius_km) = query.radius_km {
            params.push(("distanceMeters", (u64::from(radius_km) * 1000).to_string()));
        }

        let body: Value = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let listings = find_listings(&body).ok_or_else(|| {
            AppError::Fetch(format!("no listing array in response for {:?}", query.term))
        })?;

        let candidates: Vec<Candidate> = listings
            .iter()
            .take(query.limit)
            .filter_map(parse_candidate)
            .map(|mut c| {
                if !c.detail_url.starts_with("http") {
                    c.detail_url = format!("{}{}", self.base_url, c.detail_url);
                }
                c
            })
            .collect();

        debug!(
            term = %query.term,
            raw = listings.len(),
            parsed = candidates.len(),
            "marketplace search complete"
        );
        Ok(candidates)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// The search response nests its listing array at varying depths. Walk the
/// tree until we hit an array of objects that look like listings (id + title).
fn find_listings(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => {
            if let Some(first) = items.first().and_then(|v| v.as_object()) {
                if (first.contains_key("itemId") || first.contains_key("id"))
                    && first.contains_key("title")
                {
                    return Some(items);
                }
            }
            items.iter().find_map(find_listings)
        }
        Value::Object(map) => map.values().find_map(find_listings),
        _ => None,
    }
}

fn parse_candidate(item: &Value) -> Option<Candidate> {
    let listing_id = item
        .get("itemId")
        .or_else(|| item.get("id"))
        .and_then(value_to_id)?;

    let title = item
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let (price_cents, price_display) = parse_price(item.get("priceInfo"));

    let detail_url = item
        .get("url")
        .or_else(|| item.get("vipUrl"))
        .or_else(|| item.get("relativeUrl"))
        .and_then(Value::as_str)
        .map(str::to_string)?;

    let image_url = parse_image(item.get("media"));
    let posted_at = parse_posted_at(item);

    Some(Candidate {
        listing_id,
        title,
        price_cents,
        price_display,
        image_url,
        detail_url,
        posted_at,
    })
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Prefer the exact cent amount; fall back to digits of the display string
/// ("€ 60,00" → 6000). Listings priced "bieden"/"gratis" have no cents.
fn parse_price(price_info: Option<&Value>) -> (Option<i64>, String) {
    let Some(info) = price_info.and_then(Value::as_object) else {
        return (None, String::new());
    };

    if let Some(cents) = info.get("priceCents").and_then(Value::as_i64) {
        let display = info
            .get("priceDisplay")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("€ {},{:02}", cents / 100, cents % 100));
        return (Some(cents), display);
    }

    if let Some(display) = info.get("priceDisplay").and_then(Value::as_str) {
        return (price_display_to_cents(display), display.to_string());
    }

    (None, String::new())
}

/// "€ 1.250,00" → 125000. Returns None when the string holds no digits.
pub fn price_display_to_cents(display: &str) -> Option<i64> {
    let digits: String = display.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok()
}

fn parse_image(media: Option<&Value>) -> Option<String> {
    match media? {
        Value::Object(map) => map
            .get("images")
            .and_then(Value::as_array)
            .and_then(|imgs| imgs.first())
            .and_then(|img| img.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::Array(items) => items
            .first()
            .and_then(|img| img.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

const POSTED_AT_KEYS: &[&str] = &["date", "dateTime", "startDateTime", "startDate", "postedAt"];

/// Best-effort extraction of the listing's posted-at string. The field moves
/// around between API revisions, so a handful of known spots are probed.
fn parse_posted_at(item: &Value) -> Option<String> {
    for key in POSTED_AT_KEYS {
        if let Some(s) = item.get(*key).and_then(Value::as_str) {
            if !s.trim().is_empty() {
                return Some(s.trim().to_string());
            }
        }
    }
    item.get("dateInfo")
        .and_then(|info| info.get("date").or_else(|| info.get("dateTime")))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_listing_array_nested_in_response() {
        let body = json!({
            "searchRequestAndResponse": {
                "listings": [
                    { "itemId": "m100", "title": "Bike", "priceInfo": { "priceCents": 6000 } }
                ]
            }
        });
        let listings = find_listings(&body).expect("listing array");
        assert_eq!(listings.len(), 1);
    }

    #[test]
    fn no_listing_array_yields_none() {
        assert!(find_listings(&json!({ "status": "ok" })).is_none());
        assert!(find_listings(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn parses_full_candidate() {
        let item = json!({
            "itemId": "m2096078398",
            "title": "Stadsfiets 28 inch",
            "priceInfo": { "priceCents": 9000, "priceDisplay": "€ 90,00" },
            "vipUrl": "/v/fietsen/m2096078398-stadsfiets",
            "media": { "images": [ { "url": "https://img.test/1.jpg" } ] },
            "date": "23 nov 25"
        });
        let c = parse_candidate(&item).expect("candidate");
        assert_eq!(c.listing_id, "m2096078398");
        assert_eq!(c.price_cents, Some(9000));
        assert_eq!(c.price_display, "€ 90,00");
        assert_eq!(c.detail_url, "/v/fietsen/m2096078398-stadsfiets");
        assert_eq!(c.image_url.as_deref(), Some("https://img.test/1.jpg"));
        assert_eq!(c.posted_at.as_deref(), Some("23 nov 25"));
    }

    #[test]
    fn skips_items_without_id_or_url() {
        assert!(parse_candidate(&json!({ "title": "no id", "url": "/v/x" })).is_none());
        assert!(parse_candidate(&json!({ "itemId": "m1", "title": "no url" })).is_none());
    }

    #[test]
    fn price_falls_back_to_display_digits() {
        let (cents, display) =
            parse_price(Some(&json!({ "priceDisplay": "€ 1.250,00" })));
        assert_eq!(cents, Some(125000));
        assert_eq!(display, "€ 1.250,00");

        let (cents, _) = parse_price(Some(&json!({ "priceDisplay": "Bieden" })));
        assert_eq!(cents, None);
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let item = json!({ "id": 12345, "title": "t", "url": "https://x.test/v/1" });
        let c = parse_candidate(&item).expect("candidate");
        assert_eq!(c.listing_id, "12345");
    }
}
