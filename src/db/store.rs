use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{AiSummary, Place, PlaceEnrichment, PlaceHit, Request, Station};

/// A validated note ready to be persisted alongside an aggregate bump.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub nickname: String,
    pub message: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub guest_id: Uuid,
}

/// Outcome of one transactional recommendation commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The note was inserted and the aggregate count bumped.
    Saved { recommended_count: i32 },
    /// This guest already recommended this place for this request.
    /// Aggregate state is untouched.
    DuplicateGuest,
}

/// One aggregated place on a request's board.
#[derive(Debug, Clone)]
pub struct AggregatedPlace {
    pub place: Place,
    pub recommended_count: i32,
}

/// Persistence seam for the recommendation pipelines.
///
/// Handlers and services depend on this trait so tests can swap in
/// in-memory fakes; `PgStore` is the production implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn find_request(&self, slug: &str) -> AppResult<Option<Request>>;

    async fn find_station(&self, code: &str) -> AppResult<Option<Station>>;

    async fn create_request(&self, request: &Request) -> AppResult<()>;

    /// Deletes a request; aggregates and notes cascade. Returns whether a
    /// row was deleted.
    async fn delete_request(&self, slug: &str) -> AppResult<bool>;

    async fn find_places_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> AppResult<Vec<Place>>;

    /// Creates or refreshes place rows from search sightings. Repeat
    /// sightings of the same external id update, never duplicate.
    async fn upsert_places(&self, hits: &[PlaceHit]) -> AppResult<()>;

    async fn enrichment_for(
        &self,
        external_ids: &[String],
    ) -> AppResult<HashMap<String, PlaceEnrichment>>;

    /// The transactional unit of one submission item: resolve-or-create
    /// the (request, place) aggregate, reject a duplicate guest without
    /// touching the count, otherwise bump the count and insert the note.
    ///
    /// A storage-level unique violation on the note insert is reported as
    /// `DuplicateGuest`, never as an error.
    async fn record_recommendation(
        &self,
        slug: &str,
        external_id: &str,
        note: &NewNote,
    ) -> AppResult<RecordOutcome>;

    /// Aggregated places for a request, most recommended first.
    async fn list_aggregated(&self, slug: &str, limit: i64) -> AppResult<Vec<AggregatedPlace>>;

    /// Tags submitted by users for the given places under this request,
    /// aggregated across notes with order of first appearance preserved.
    async fn user_tags(
        &self,
        slug: &str,
        external_ids: &[String],
    ) -> AppResult<HashMap<String, Vec<String>>>;

    async fn summaries_for(
        &self,
        external_ids: &[String],
    ) -> AppResult<HashMap<String, AiSummary>>;

    async fn has_summary(&self, external_id: &str) -> AppResult<bool>;

    async fn save_summary(
        &self,
        external_id: &str,
        summary_text: &str,
        evidence: &serde_json::Value,
    ) -> AppResult<()>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EnrichmentRow {
    external_id: String,
    rating: Option<f64>,
    rating_count: Option<i32>,
    review_snippets: Option<Json<Vec<String>>>,
    image_urls: Option<Json<Vec<String>>>,
    opening_hours: Option<Json<Vec<String>>>,
}

#[derive(sqlx::FromRow)]
struct AggregatedRow {
    id: i64,
    external_id: String,
    place_name: String,
    category_group_code: Option<String>,
    category_group_name: Option<String>,
    category_name: Option<String>,
    phone: Option<String>,
    address_name: Option<String>,
    road_address_name: Option<String>,
    x: String,
    y: String,
    place_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    recommended_count: i32,
}

impl From<AggregatedRow> for AggregatedPlace {
    fn from(row: AggregatedRow) -> Self {
        AggregatedPlace {
            recommended_count: row.recommended_count,
            place: Place {
                id: row.id,
                external_id: row.external_id,
                place_name: row.place_name,
                category_group_code: row.category_group_code,
                category_group_name: row.category_group_name,
                category_name: row.category_name,
                phone: row.phone,
                address_name: row.address_name,
                road_address_name: row.road_address_name,
                x: row.x,
                y: row.y,
                place_url: row.place_url,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagRow {
    external_id: String,
    tags: Option<Json<Vec<String>>>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    external_id: String,
    summary_text: String,
    evidence: Json<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl RecommendationStore for PgStore {
    async fn find_request(&self, slug: &str) -> AppResult<Option<Request>> {
        let request = sqlx::query_as::<_, Request>(
            "SELECT slug, owner_nickname, station_code, request_message, created_at \
             FROM requests WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    async fn find_station(&self, code: &str) -> AppResult<Option<Station>> {
        let station = sqlx::query_as::<_, Station>(
            "SELECT code, name, line, lat::double precision AS lat, lng::double precision AS lng \
             FROM stations WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(station)
    }

    async fn create_request(&self, request: &Request) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO requests (slug, owner_nickname, station_code, request_message, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&request.slug)
        .bind(&request.owner_nickname)
        .bind(&request.station_code)
        .bind(&request.request_message)
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_request(&self, slug: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM requests WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_places_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> AppResult<Vec<Place>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }

        let places = sqlx::query_as::<_, Place>(
            "SELECT id, external_id, place_name, category_group_code, category_group_name, \
                    category_name, phone, address_name, road_address_name, x, y, place_url, \
                    created_at, updated_at \
             FROM places WHERE external_id = ANY($1)",
        )
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(places)
    }

    async fn upsert_places(&self, hits: &[PlaceHit]) -> AppResult<()> {
        for hit in hits {
            sqlx::query(
                "INSERT INTO places \
                    (external_id, place_name, category_group_code, category_group_name, \
                     category_name, phone, address_name, road_address_name, x, y, place_url) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (external_id) DO UPDATE SET \
                    place_name = EXCLUDED.place_name, \
                    category_group_code = EXCLUDED.category_group_code, \
                    category_group_name = EXCLUDED.category_group_name, \
                    category_name = EXCLUDED.category_name, \
                    phone = EXCLUDED.phone, \
                    address_name = EXCLUDED.address_name, \
                    road_address_name = EXCLUDED.road_address_name, \
                    x = EXCLUDED.x, \
                    y = EXCLUDED.y, \
                    place_url = EXCLUDED.place_url, \
                    updated_at = now()",
            )
            .bind(&hit.external_id)
            .bind(&hit.place_name)
            .bind(&hit.category_group_code)
            .bind(&hit.category_group_name)
            .bind(&hit.category_name)
            .bind(&hit.phone)
            .bind(&hit.address_name)
            .bind(&hit.road_address_name)
            .bind(&hit.x)
            .bind(&hit.y)
            .bind(&hit.place_url)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn enrichment_for(
        &self,
        external_ids: &[String],
    ) -> AppResult<HashMap<String, PlaceEnrichment>> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, EnrichmentRow>(
            "SELECT external_id, rating::double precision AS rating, rating_count, \
                    review_snippets, image_urls, opening_hours \
             FROM place_enrichment WHERE external_id = ANY($1)",
        )
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        let map = rows
            .into_iter()
            .map(|row| {
                (
                    row.external_id,
                    PlaceEnrichment {
                        rating: row.rating,
                        rating_count: row.rating_count,
                        review_snippets: row.review_snippets.map(|j| j.0),
                        image_urls: row.image_urls.map(|j| j.0),
                        opening_hours: row.opening_hours.map(|j| j.0),
                    },
                )
            })
            .collect();

        Ok(map)
    }

    async fn record_recommendation(
        &self,
        slug: &str,
        external_id: &str,
        note: &NewNote,
    ) -> AppResult<RecordOutcome> {
        let mut tx = self.pool.begin().await?;

        // Upsert-or-retry on the unique (request, place) pair: a concurrent
        // creator wins the insert, we pick the surviving row up below.
        sqlx::query(
            "INSERT INTO request_place_aggregates (request_slug, place_external_id) \
             VALUES ($1, $2) \
             ON CONFLICT (request_slug, place_external_id) DO NOTHING",
        )
        .bind(slug)
        .bind(external_id)
        .execute(&mut *tx)
        .await?;

        // Row lock sequences concurrent guests on the same aggregate.
        let (aggregate_id,): (i64,) = sqlx::query_as(
            "SELECT id FROM request_place_aggregates \
             WHERE request_slug = $1 AND place_external_id = $2 \
             FOR UPDATE",
        )
        .bind(slug)
        .bind(external_id)
        .fetch_one(&mut *tx)
        .await?;

        let (already,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM recommendation_notes \
                           WHERE aggregate_id = $1 AND guest_id = $2)",
        )
        .bind(aggregate_id)
        .bind(note.guest_id)
        .fetch_one(&mut *tx)
        .await?;

        if already {
            tx.rollback().await?;
            return Ok(RecordOutcome::DuplicateGuest);
        }

        let (recommended_count,): (i32,) = sqlx::query_as(
            "UPDATE request_place_aggregates \
             SET recommended_count = recommended_count + 1, last_recommended_at = now() \
             WHERE id = $1 \
             RETURNING recommended_count",
        )
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            "INSERT INTO recommendation_notes \
                (aggregate_id, nickname, recommend_message, image_url, tags, guest_id) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(aggregate_id)
        .bind(&note.nickname)
        .bind(&note.message)
        .bind(&note.image_url)
        .bind(Json(&note.tags))
        .bind(note.guest_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let unique_violation = e
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false);
            if unique_violation {
                // A racing submission for the same guest landed first.
                tx.rollback().await?;
                return Ok(RecordOutcome::DuplicateGuest);
            }
            return Err(e.into());
        }

        tx.commit().await?;

        Ok(RecordOutcome::Saved { recommended_count })
    }

    async fn list_aggregated(&self, slug: &str, limit: i64) -> AppResult<Vec<AggregatedPlace>> {
        let rows = sqlx::query_as::<_, AggregatedRow>(
            "SELECT p.id, p.external_id, p.place_name, p.category_group_code, \
                    p.category_group_name, p.category_name, p.phone, p.address_name, \
                    p.road_address_name, p.x, p.y, p.place_url, p.created_at, p.updated_at, \
                    rpa.recommended_count \
             FROM request_place_aggregates rpa \
             JOIN places p ON p.external_id = rpa.place_external_id \
             WHERE rpa.request_slug = $1 \
             ORDER BY rpa.recommended_count DESC, rpa.first_recommended_at ASC \
             LIMIT $2",
        )
        .bind(slug)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AggregatedPlace::from).collect())
    }

    async fn user_tags(
        &self,
        slug: &str,
        external_ids: &[String],
    ) -> AppResult<HashMap<String, Vec<String>>> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT rpa.place_external_id AS external_id, rn.tags \
             FROM recommendation_notes rn \
             JOIN request_place_aggregates rpa ON rpa.id = rn.aggregate_id \
             WHERE rpa.request_slug = $1 AND rpa.place_external_id = ANY($2) \
             ORDER BY rn.created_at ASC",
        )
        .bind(slug)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let Some(Json(tags)) = row.tags else { continue };
            let entry = map.entry(row.external_id).or_default();
            for tag in tags {
                if !entry.contains(&tag) {
                    entry.push(tag);
                }
            }
        }
        map.retain(|_, tags| !tags.is_empty());

        Ok(map)
    }

    async fn summaries_for(
        &self,
        external_ids: &[String],
    ) -> AppResult<HashMap<String, AiSummary>> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT external_id, summary_text, evidence, updated_at \
             FROM place_summaries WHERE external_id = ANY($1)",
        )
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        let map = rows
            .into_iter()
            .map(|row| {
                (
                    row.external_id,
                    AiSummary {
                        summary_text: row.summary_text,
                        evidence: row.evidence.0,
                        updated_at: row.updated_at,
                    },
                )
            })
            .collect();

        Ok(map)
    }

    async fn has_summary(&self, external_id: &str) -> AppResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM place_summaries WHERE external_id = $1)",
        )
        .bind(external_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn save_summary(
        &self,
        external_id: &str,
        summary_text: &str,
        evidence: &serde_json::Value,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO place_summaries (external_id, summary_text, evidence, updated_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (external_id) DO UPDATE SET \
                summary_text = EXCLUDED.summary_text, \
                evidence = EXCLUDED.evidence, \
                updated_at = now()",
        )
        .bind(external_id)
        .bind(summary_text)
        .bind(Json(evidence))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
