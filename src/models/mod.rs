use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Search providers whose external ids we accept, in `"<provider>:<id>"` form.
pub const KNOWN_PROVIDERS: &[&str] = &["kakao", "mock"];

/// Splits an external id into (provider, provider-local id).
///
/// Returns `None` unless the provider prefix is recognized and the local id
/// is non-empty.
pub fn split_external_id(external_id: &str) -> Option<(&str, &str)> {
    let (provider, local) = external_id.split_once(':')?;
    if local.is_empty() || !KNOWN_PROVIDERS.contains(&provider) {
        return None;
    }
    Some((provider, local))
}

/// A transit station, pre-seeded into the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Station {
    pub code: String,
    pub name: String,
    pub line: String,
    pub lat: f64,
    pub lng: f64,
}

/// A shareable recommendation board anchored to one station.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Request {
    pub slug: String,
    pub owner_nickname: String,
    pub station_code: String,
    pub request_message: String,
    pub created_at: DateTime<Utc>,
}

/// A deduplicated physical location, keyed by its upstream external id.
///
/// Coordinates are kept as the provider's decimal strings to preserve
/// source precision.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Place {
    pub id: i64,
    pub external_id: String,
    pub place_name: String,
    pub category_group_code: Option<String>,
    pub category_group_name: Option<String>,
    pub category_name: Option<String>,
    pub phone: Option<String>,
    pub address_name: Option<String>,
    pub road_address_name: Option<String>,
    pub x: String,
    pub y: String,
    pub place_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional rating/review enrichment attached to a place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaceEnrichment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_snippets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<Vec<String>>,
}

impl PlaceEnrichment {
    pub fn is_empty(&self) -> bool {
        self.rating.is_none()
            && self.rating_count.is_none()
            && self.review_snippets.is_none()
            && self.image_urls.is_none()
            && self.opening_hours.is_none()
    }
}

/// One place returned by a keyword search, before any persistence.
///
/// Serializable so whole search responses can be cached in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceHit {
    pub external_id: String,
    pub provider_place_id: String,
    pub place_name: String,
    pub category_group_code: Option<String>,
    pub category_group_name: Option<String>,
    pub category_name: Option<String>,
    pub phone: Option<String>,
    pub address_name: Option<String>,
    pub road_address_name: Option<String>,
    pub x: String,
    pub y: String,
    pub place_url: Option<String>,
    pub distance_m: Option<i32>,
    pub enrichment: Option<PlaceEnrichment>,
}

/// Stored one-line AI summary for a place, with the evidence it was
/// generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSummary {
    pub summary_text: String,
    pub evidence: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// The item shape shared by the human-facing detail view and the
/// auto-recommendation response, so one client component renders both.
#[derive(Debug, Clone, Serialize)]
pub struct DetailItem {
    pub external_id: String,
    /// Provider-local id, stripped of the provider prefix.
    pub id: String,
    pub place_name: String,
    pub category_group_code: Option<String>,
    pub category_group_name: Option<String>,
    pub category_name: Option<String>,
    pub address_name: Option<String>,
    pub road_address_name: Option<String>,
    pub x: String,
    pub y: String,
    pub distance_m: Option<i32>,
    pub place_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<PlaceEnrichment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_count: Option<i32>,
}

impl From<&PlaceHit> for DetailItem {
    fn from(hit: &PlaceHit) -> Self {
        Self {
            external_id: hit.external_id.clone(),
            id: hit.provider_place_id.clone(),
            place_name: hit.place_name.clone(),
            category_group_code: hit.category_group_code.clone(),
            category_group_name: hit.category_group_name.clone(),
            category_name: hit.category_name.clone(),
            address_name: hit.address_name.clone(),
            road_address_name: hit.road_address_name.clone(),
            x: hit.x.clone(),
            y: hit.y.clone(),
            distance_m: hit.distance_m,
            place_url: hit.place_url.clone(),
            enrichment: hit.enrichment.clone().filter(|e| !e.is_empty()),
            ai: None,
            recommended_count: None,
        }
    }
}

/// Detail-view response, also returned by the auto-recommendation endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetailResponse {
    pub slug: String,
    pub station: Station,
    pub request_message: String,
    pub items: Vec<DetailItem>,
}
