use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::{
    db::RecommendationStore,
    error::{AppError, AppResult},
    models::{AiSummary, DetailItem, PlaceHit, RequestDetailResponse, Station},
    services::{
        category::normalize_category_keyword,
        keywords::{KeywordExtractor, DEFAULT_KEYWORD},
        providers::PlaceSearchPort,
        summary::{SummaryEnricher, SummaryEvidence},
    },
};

/// Candidates gathered across keyword searches before the count cut.
const POOL_LIMIT: usize = 10;

/// Aggregates scanned for exclusion and category harvesting.
const EXCLUSION_SCAN_LIMIT: i64 = 100;

const MIN_COUNT: usize = 1;
const MAX_COUNT: usize = 5;

/// Clamps the requested result count into the supported range. A missing
/// count means one.
pub fn clamp_count(n: Option<i64>) -> usize {
    let n = n.unwrap_or(MIN_COUNT as i64);
    n.clamp(MIN_COUNT as i64, MAX_COUNT as i64) as usize
}

/// Plans "what to recommend next" for a request: searches around the
/// station using keywords mined from the request message and the board's
/// own category mix, skips anything already on the board, and dresses the
/// picks with evidence and a one-line summary.
pub struct AutoRecommendationPlanner {
    store: Arc<dyn RecommendationStore>,
    search: Arc<dyn PlaceSearchPort>,
    keywords: Arc<dyn KeywordExtractor>,
    summaries: Arc<dyn SummaryEnricher>,
}

impl AutoRecommendationPlanner {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        search: Arc<dyn PlaceSearchPort>,
        keywords: Arc<dyn KeywordExtractor>,
        summaries: Arc<dyn SummaryEnricher>,
    ) -> Self {
        Self {
            store,
            search,
            keywords,
            summaries,
        }
    }

    pub async fn plan(&self, slug: &str, count: usize) -> AppResult<RequestDetailResponse> {
        let request = self
            .store
            .find_request(slug)
            .await?
            .ok_or_else(|| AppError::NotFound("request not found".to_string()))?;
        let station = self
            .store
            .find_station(&request.station_code)
            .await?
            .ok_or_else(|| AppError::NotFound("station not found".to_string()))?;

        let aggregated = self.store.list_aggregated(slug, EXCLUSION_SCAN_LIMIT).await?;
        let excluded: HashSet<String> = aggregated
            .iter()
            .map(|a| a.place.external_id.clone())
            .collect();

        // Board categories lead so the search stays on what this board is
        // already about; message keywords follow.
        let mut keywords: Vec<String> = Vec::new();
        for aggregate in &aggregated {
            let Some(category) = aggregate.place.category_name.as_deref() else {
                continue;
            };
            let Some(keyword) = normalize_category_keyword(category) else {
                continue;
            };
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        for keyword in self.keywords.extract(&request.request_message).await {
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        if keywords.is_empty() {
            keywords.push(DEFAULT_KEYWORD.to_string());
        }

        // The pool fills to its cap before exclusion, so places already on
        // the board consume slots; filtering afterwards may leave nothing.
        let pool = self.gather_pool(&station, &keywords).await?;
        let picks: Vec<PlaceHit> = pool
            .into_iter()
            .filter(|hit| !excluded.contains(&hit.external_id))
            .take(count)
            .collect();

        let items = self.build_items(slug, picks).await?;

        tracing::info!(
            slug = %slug,
            station = %station.code,
            keywords = ?keywords,
            excluded = excluded.len(),
            picked = items.len(),
            "Auto-recommendation planned"
        );

        Ok(RequestDetailResponse {
            slug: request.slug,
            station,
            request_message: request.request_message,
            items,
        })
    }

    /// Searches keyword by keyword, keeping the first occurrence of each
    /// place in insertion order, until the pool is full.
    async fn gather_pool(
        &self,
        station: &Station,
        keywords: &[String],
    ) -> AppResult<Vec<PlaceHit>> {
        let mut pool: Vec<PlaceHit> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for keyword in keywords {
            if pool.len() >= POOL_LIMIT {
                break;
            }
            let hits = self.search.search(station, keyword).await?;
            for hit in hits {
                if pool.len() >= POOL_LIMIT {
                    break;
                }
                if !seen.insert(hit.external_id.clone()) {
                    continue;
                }
                pool.push(hit);
            }
        }

        Ok(pool)
    }

    /// Attaches an evidence-backed summary to each picked hit. Summaries
    /// are generated per call and never written back; stored summaries
    /// belong to the detail view and the background worker. A failed
    /// summary leaves the item bare rather than failing the plan.
    async fn build_items(&self, slug: &str, picks: Vec<PlaceHit>) -> AppResult<Vec<DetailItem>> {
        let external_ids: Vec<String> = picks.iter().map(|h| h.external_id.clone()).collect();
        let mut user_tags = self.store.user_tags(slug, &external_ids).await?;

        let mut items = Vec::with_capacity(picks.len());
        for hit in &picks {
            let mut item = DetailItem::from(hit);

            let evidence = SummaryEvidence {
                place_name: hit.place_name.clone(),
                category_name: hit.category_name.clone(),
                rating: hit.enrichment.as_ref().and_then(|e| e.rating),
                rating_count: hit.enrichment.as_ref().and_then(|e| e.rating_count),
                review_snippets: hit.enrichment.as_ref().and_then(|e| e.review_snippets.clone()),
                user_tags: user_tags.remove(&hit.external_id),
            };

            if let Some(summary_text) = self.summaries.summarize(&evidence).await {
                item.ai = Some(AiSummary {
                    summary_text,
                    evidence: evidence.to_json(),
                    updated_at: Utc::now(),
                });
            }

            items.push(item);
        }

        Ok(items)
    }
}
