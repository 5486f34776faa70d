/// Kakao Local keyword-search provider
///
/// Wraps `/v2/local/search/keyword.json`, caches raw documents per
/// (station, keyword), upserts every sighted place, merges stored
/// enrichment, and ranks by distance, rating, rating count.
use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    cached,
    db::{Cache, CacheKey, RecommendationStore},
    error::{AppError, AppResult},
    geo,
    models::{PlaceHit, Station},
    services::providers::PlaceSearchPort,
};

const SEARCH_CACHE_TTL: u64 = 300; // 5 minutes

/// Raw Kakao search document. Coordinates and distance arrive as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KakaoDocument {
    pub id: String,
    pub place_name: String,
    #[serde(default)]
    pub category_group_code: Option<String>,
    #[serde(default)]
    pub category_group_name: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address_name: Option<String>,
    #[serde(default)]
    pub road_address_name: Option<String>,
    pub x: String,
    pub y: String,
    #[serde(default)]
    pub place_url: Option<String>,
    #[serde(default)]
    pub distance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KakaoSearchResponse {
    documents: Vec<KakaoDocument>,
}

pub struct KakaoPlaceSearch {
    http_client: HttpClient,
    api_url: String,
    api_key: String,
    cache: Cache,
    store: Arc<dyn RecommendationStore>,
    radius_m: u32,
    top_n: usize,
}

impl KakaoPlaceSearch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http_client: HttpClient,
        api_url: String,
        api_key: String,
        cache: Cache,
        store: Arc<dyn RecommendationStore>,
        radius_m: u32,
        top_n: usize,
    ) -> Self {
        Self {
            http_client,
            api_url,
            api_key,
            cache,
            store,
            radius_m,
            top_n,
        }
    }

    async fn fetch_documents(
        &self,
        station: &Station,
        keyword: &str,
    ) -> AppResult<Vec<KakaoDocument>> {
        let url = format!("{}/v2/local/search/keyword.json", self.api_url);

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("KakaoAK {}", self.api_key))
            .query(&[
                ("query", keyword),
                ("x", &station.lng.to_string()),
                ("y", &station.lat.to_string()),
                ("radius", &self.radius_m.to_string()),
                ("size", &self.top_n.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Kakao API returned status {}: {}",
                status, body
            )));
        }

        let search_response: KakaoSearchResponse = response.json().await?;
        Ok(search_response.documents)
    }

    fn to_hit(&self, station: &Station, doc: KakaoDocument) -> PlaceHit {
        // Provider distance wins; fall back to haversine from the station.
        let distance_m = doc
            .distance
            .as_deref()
            .and_then(|d| d.trim().parse::<i32>().ok())
            .or_else(|| geo::distance_m(station.lat, station.lng, &doc.y, &doc.x));

        PlaceHit {
            external_id: format!("kakao:{}", doc.id),
            provider_place_id: doc.id,
            place_name: doc.place_name,
            category_group_code: doc.category_group_code,
            category_group_name: doc.category_group_name,
            category_name: doc.category_name,
            phone: doc.phone,
            address_name: doc.address_name,
            road_address_name: doc.road_address_name,
            x: doc.x,
            y: doc.y,
            place_url: doc.place_url,
            distance_m,
            enrichment: None,
        }
    }
}

/// Ranking: distance asc (unknown last), rating desc, rating count desc.
fn rank_hits(hits: &mut [PlaceHit]) {
    hits.sort_by(|a, b| {
        let da = a.distance_m.map_or(i64::MAX, i64::from);
        let db = b.distance_m.map_or(i64::MAX, i64::from);
        da.cmp(&db)
            .then_with(|| {
                let ra = a.enrichment.as_ref().and_then(|e| e.rating).unwrap_or(0.0);
                let rb = b.enrichment.as_ref().and_then(|e| e.rating).unwrap_or(0.0);
                rb.partial_cmp(&ra).unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                let ca = a
                    .enrichment
                    .as_ref()
                    .and_then(|e| e.rating_count)
                    .unwrap_or(0);
                let cb = b
                    .enrichment
                    .as_ref()
                    .and_then(|e| e.rating_count)
                    .unwrap_or(0);
                cb.cmp(&ca)
            })
    });
}

#[async_trait]
impl PlaceSearchPort for KakaoPlaceSearch {
    async fn search(&self, station: &Station, keyword: &str) -> AppResult<Vec<PlaceHit>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(AppError::InvalidInput(
                "Search keyword cannot be empty".to_string(),
            ));
        }

        // No API key: degrade to an empty result rather than failing the
        // surrounding request.
        if self.api_key.is_empty() {
            tracing::warn!("Kakao API key not configured, returning empty search result");
            return Ok(Vec::new());
        }

        let key = CacheKey::PlaceSearch {
            station_code: station.code.clone(),
            keyword: keyword.to_string(),
        };

        let docs: AppResult<Vec<KakaoDocument>> = cached!(
            self.cache,
            key,
            SEARCH_CACHE_TTL,
            self.fetch_documents(station, keyword)
        );
        let docs = docs?;

        let mut hits: Vec<PlaceHit> = docs
            .into_iter()
            .map(|doc| self.to_hit(station, doc))
            .collect();

        self.store.upsert_places(&hits).await?;

        let external_ids: Vec<String> = hits.iter().map(|h| h.external_id.clone()).collect();
        let mut enrichment = self.store.enrichment_for(&external_ids).await?;
        for hit in &mut hits {
            hit.enrichment = enrichment.remove(&hit.external_id);
        }

        rank_hits(&mut hits);
        hits.truncate(self.top_n);

        tracing::info!(
            keyword = %keyword,
            station = %station.code,
            results = hits.len(),
            provider = "kakao",
            "Place search completed"
        );

        Ok(hits)
    }
}
