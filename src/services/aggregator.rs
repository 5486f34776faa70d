use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{NewNote, RecommendationStore, RecordOutcome},
    error::{AppError, AppResult},
    geo,
    models::{split_external_id, Place, Station},
};

/// One human submission against a request's board.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionItem {
    pub external_id: Option<String>,
    pub recommender_nickname: Option<String>,
    pub recommend_message: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub guest_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SavedItem {
    pub external_id: String,
    pub recommended_count: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SimpleItem {
    pub external_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutOfRadiusItem {
    pub external_id: String,
    pub distance_m: Option<i32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InvalidItem {
    pub external_id: Option<String>,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BucketTotals {
    pub saved: u32,
    pub conflicts: u32,
    pub out_of_radius: u32,
    pub not_found: u32,
    pub invalid: u32,
}

/// Whole-batch result: every input item lands in exactly one bucket.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmitResponse {
    pub saved: Vec<SavedItem>,
    pub conflicts: Vec<SimpleItem>,
    pub out_of_radius: Vec<OutOfRadiusItem>,
    pub not_found: Vec<SimpleItem>,
    pub invalid: Vec<InvalidItem>,
    pub totals: BucketTotals,
}

/// Per-item outcome; reduced into the five response buckets. Items are
/// routed, never thrown: one bad item must not abort the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Saved(SavedItem),
    Conflict(SimpleItem),
    OutOfRadius(OutOfRadiusItem),
    NotFound(SimpleItem),
    Invalid(InvalidItem),
}

impl SubmitResponse {
    fn push(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Saved(item) => {
                self.saved.push(item);
                self.totals.saved += 1;
            }
            ItemOutcome::Conflict(item) => {
                self.conflicts.push(item);
                self.totals.conflicts += 1;
            }
            ItemOutcome::OutOfRadius(item) => {
                self.out_of_radius.push(item);
                self.totals.out_of_radius += 1;
            }
            ItemOutcome::NotFound(item) => {
                self.not_found.push(item);
                self.totals.not_found += 1;
            }
            ItemOutcome::Invalid(item) => {
                self.invalid.push(item);
                self.totals.invalid += 1;
            }
        }
    }
}

/// A submission item that survived field validation.
struct ValidItem {
    external_id: String,
    nickname: String,
    message: Option<String>,
    image_url: Option<String>,
    tags: Vec<String>,
    guest_id: Uuid,
}

/// Owns the submission pipeline: validation, geofencing, idempotent
/// counting, note persistence.
pub struct RecommendationAggregator {
    store: Arc<dyn RecommendationStore>,
    radius_m: u32,
    allowed_tags: Vec<String>,
}

impl RecommendationAggregator {
    pub fn new(store: Arc<dyn RecommendationStore>, radius_m: u32, allowed_tags: Vec<String>) -> Self {
        Self {
            store,
            radius_m,
            allowed_tags,
        }
    }

    /// Processes a submission batch against the request identified by
    /// `slug`. Items are handled independently; the response partitions
    /// the whole batch. An empty batch yields all-zero totals.
    pub async fn submit(
        &self,
        slug: &str,
        items: Vec<SubmissionItem>,
    ) -> AppResult<SubmitResponse> {
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

        let mut response = SubmitResponse::default();
        if items.is_empty() {
            return Ok(response);
        }

        // Batch-resolve places once up front.
        let external_ids: Vec<String> = items
            .iter()
            .filter_map(|it| it.external_id.as_deref())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        let places: HashMap<String, Place> = self
            .store
            .find_places_by_external_ids(&external_ids)
            .await?
            .into_iter()
            .map(|p| (p.external_id.clone(), p))
            .collect();

        for item in items {
            let outcome = self.process_item(slug, &station, &places, item).await?;
            response.push(outcome);
        }

        tracing::info!(
            slug = %slug,
            saved = response.totals.saved,
            conflicts = response.totals.conflicts,
            out_of_radius = response.totals.out_of_radius,
            not_found = response.totals.not_found,
            invalid = response.totals.invalid,
            "Submission batch processed"
        );

        Ok(response)
    }

    async fn process_item(
        &self,
        slug: &str,
        station: &Station,
        places: &HashMap<String, Place>,
        item: SubmissionItem,
    ) -> AppResult<ItemOutcome> {
        let valid = match self.validate_item(item) {
            Ok(valid) => valid,
            Err(invalid) => return Ok(ItemOutcome::Invalid(invalid)),
        };

        let Some(place) = places.get(&valid.external_id) else {
            return Ok(ItemOutcome::NotFound(SimpleItem {
                external_id: valid.external_id,
            }));
        };

        let distance_m = geo::distance_m(station.lat, station.lng, &place.y, &place.x);
        match distance_m {
            Some(d) if d <= self.radius_m as i32 => {}
            _ => {
                // Unmeasurable coordinates are treated as out of radius
                // with a null distance.
                return Ok(ItemOutcome::OutOfRadius(OutOfRadiusItem {
                    external_id: valid.external_id,
                    distance_m,
                }));
            }
        }

        let note = NewNote {
            nickname: valid.nickname,
            message: valid.message,
            image_url: valid.image_url,
            tags: valid.tags,
            guest_id: valid.guest_id,
        };

        match self
            .store
            .record_recommendation(slug, &valid.external_id, &note)
            .await?
        {
            RecordOutcome::Saved { recommended_count } => Ok(ItemOutcome::Saved(SavedItem {
                external_id: valid.external_id,
                recommended_count,
            })),
            RecordOutcome::DuplicateGuest => Ok(ItemOutcome::Conflict(SimpleItem {
                external_id: valid.external_id,
            })),
        }
    }

    /// Field validation. Any violation routes the whole item to the
    /// `invalid` bucket with a field-to-reason map; tags outside the
    /// allow-list invalidate the item rather than being dropped.
    fn validate_item(&self, item: SubmissionItem) -> Result<ValidItem, InvalidItem> {
        let mut details = BTreeMap::new();

        let external_id = item
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        match &external_id {
            Some(id) if split_external_id(id).is_some() => {}
            _ => {
                details.insert("external_id".to_string(), "invalid_format".to_string());
            }
        }

        let nickname = item
            .recommender_nickname
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let nickname_len = nickname.chars().count();
        if !(2..=16).contains(&nickname_len) {
            details.insert(
                "recommender_nickname".to_string(),
                "length_2_to_16".to_string(),
            );
        }

        if let Some(message) = &item.recommend_message {
            if message.chars().count() > 300 {
                details.insert("recommend_message".to_string(), "max_length_300".to_string());
            }
        }

        if let Some(image_url) = &item.image_url {
            if image_url.chars().count() > 1000 {
                details.insert("image_url".to_string(), "max_length_1000".to_string());
            }
        }

        let guest_id = item
            .guest_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s.trim()).ok());
        if guest_id.is_none() {
            details.insert("guest_id".to_string(), "invalid_uuid".to_string());
        }

        let raw_tags = item.tags.unwrap_or_default();
        if raw_tags.len() > 3 {
            details.insert("tags".to_string(), "max_size_3".to_string());
        }
        let tags: Vec<String> = raw_tags.iter().map(|t| t.trim().to_string()).collect();
        if tags.iter().any(|t| !self.allowed_tags.contains(t)) {
            details.insert("tags".to_string(), "invalid_value".to_string());
        }

        if !details.is_empty() {
            return Err(InvalidItem {
                external_id,
                details,
            });
        }

        Ok(ValidItem {
            external_id: external_id.unwrap_or_default(),
            nickname,
            message: item.recommend_message,
            image_url: item.image_url,
            tags,
            guest_id: guest_id.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MockRecommendationStore;
    use crate::models::{Request, Station};
    use chrono::Utc;
    use mockall::predicate::*;

    const SLUG: &str = "test-slug";
    const GUEST: &str = "4a1f9068-2f3b-4d52-9f6e-0a3a5e3f7f11";

    fn allowed_tags() -> Vec<String> {
        ["분위기 맛집", "핫플", "힐링 스팟", "또간집", "숨은 맛집", "가성비 갑"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn station() -> Station {
        Station {
            code: "S0219".to_string(),
            name: "강남".to_string(),
            line: "2호선".to_string(),
            lat: 37.50,
            lng: 127.03,
        }
    }

    fn request() -> Request {
        Request {
            slug: SLUG.to_string(),
            owner_nickname: "board-owner".to_string(),
            station_code: "S0219".to_string(),
            request_message: "조용한 카페 추천해줘".to_string(),
            created_at: Utc::now(),
        }
    }

    fn place(external_id: &str, y: &str, x: &str) -> Place {
        Place {
            id: 1,
            external_id: external_id.to_string(),
            place_name: "어느 가게".to_string(),
            category_group_code: None,
            category_group_name: None,
            category_name: Some("음식점 > 카페".to_string()),
            phone: None,
            address_name: None,
            road_address_name: None,
            x: x.to_string(),
            y: y.to_string(),
            place_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(external_id: &str) -> SubmissionItem {
        SubmissionItem {
            external_id: Some(external_id.to_string()),
            recommender_nickname: Some("추천자".to_string()),
            recommend_message: Some("좋아요".to_string()),
            image_url: None,
            tags: Some(vec!["핫플".to_string()]),
            guest_id: Some(GUEST.to_string()),
        }
    }

    fn store_with_request() -> MockRecommendationStore {
        let mut store = MockRecommendationStore::new();
        store
            .expect_find_request()
            .with(eq(SLUG))
            .returning(|_| Ok(Some(request())));
        store
            .expect_find_station()
            .with(eq("S0219"))
            .returning(|_| Ok(Some(station())));
        store
    }

    #[tokio::test]
    async fn test_unknown_request_is_404() {
        let mut store = MockRecommendationStore::new();
        store.expect_find_request().returning(|_| Ok(None));

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let err = aggregator.submit("nope", vec![item("kakao:1")]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_yields_zero_totals() {
        let store = store_with_request();
        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());

        let response = aggregator.submit(SLUG, vec![]).await.unwrap();
        assert_eq!(response.totals, BucketTotals::default());
        assert!(response.saved.is_empty());
    }

    #[tokio::test]
    async fn test_saved_within_radius() {
        let mut store = store_with_request();
        store
            .expect_find_places_by_external_ids()
            .returning(|_| Ok(vec![place("kakao:1", "37.501", "127.031")]));
        store
            .expect_record_recommendation()
            .returning(|_, _, _| Ok(RecordOutcome::Saved { recommended_count: 1 }));

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, vec![item("kakao:1")]).await.unwrap();

        assert_eq!(response.totals.saved, 1);
        assert_eq!(
            response.saved[0],
            SavedItem {
                external_id: "kakao:1".to_string(),
                recommended_count: 1
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_guest_lands_in_conflicts() {
        let mut store = store_with_request();
        store
            .expect_find_places_by_external_ids()
            .returning(|_| Ok(vec![place("kakao:1", "37.501", "127.031")]));
        store
            .expect_record_recommendation()
            .returning(|_, _, _| Ok(RecordOutcome::DuplicateGuest));

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, vec![item("kakao:1")]).await.unwrap();

        assert_eq!(response.totals.conflicts, 1);
        assert_eq!(response.conflicts[0].external_id, "kakao:1");
        assert_eq!(response.totals.saved, 0);
    }

    #[tokio::test]
    async fn test_far_place_lands_out_of_radius_with_distance() {
        let mut store = store_with_request();
        // ~2 km north of the station.
        store
            .expect_find_places_by_external_ids()
            .returning(|_| Ok(vec![place("kakao:2", "37.518", "127.03")]));

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, vec![item("kakao:2")]).await.unwrap();

        assert_eq!(response.totals.out_of_radius, 1);
        let distance = response.out_of_radius[0].distance_m.unwrap();
        assert!((distance - 2000).abs() <= 20, "got {}", distance);
    }

    #[tokio::test]
    async fn test_unparsable_coordinates_are_out_of_radius_null_distance() {
        let mut store = store_with_request();
        store
            .expect_find_places_by_external_ids()
            .returning(|_| Ok(vec![place("kakao:3", "not-a-coord", "127.03")]));

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, vec![item("kakao:3")]).await.unwrap();

        assert_eq!(response.totals.out_of_radius, 1);
        assert_eq!(response.out_of_radius[0].distance_m, None);
    }

    #[tokio::test]
    async fn test_unknown_place_lands_not_found() {
        let mut store = store_with_request();
        store
            .expect_find_places_by_external_ids()
            .returning(|_| Ok(vec![]));

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, vec![item("kakao:9")]).await.unwrap();

        assert_eq!(response.totals.not_found, 1);
        assert_eq!(response.not_found[0].external_id, "kakao:9");
    }

    #[tokio::test]
    async fn test_invalid_fields_collected_per_item() {
        let mut store = store_with_request();
        store
            .expect_find_places_by_external_ids()
            .returning(|_| Ok(vec![]));

        let bad = SubmissionItem {
            external_id: Some("google:1".to_string()),
            recommender_nickname: Some("a".to_string()),
            recommend_message: Some("x".repeat(301)),
            image_url: Some("y".repeat(1001)),
            tags: None,
            guest_id: Some("not-a-uuid".to_string()),
        };

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, vec![bad]).await.unwrap();

        assert_eq!(response.totals.invalid, 1);
        let details = &response.invalid[0].details;
        assert_eq!(details.get("external_id").unwrap(), "invalid_format");
        assert_eq!(details.get("recommender_nickname").unwrap(), "length_2_to_16");
        assert_eq!(details.get("recommend_message").unwrap(), "max_length_300");
        assert_eq!(details.get("image_url").unwrap(), "max_length_1000");
        assert_eq!(details.get("guest_id").unwrap(), "invalid_uuid");
    }

    #[tokio::test]
    async fn test_disallowed_tag_invalidates_whole_item() {
        let mut store = store_with_request();
        store
            .expect_find_places_by_external_ids()
            .returning(|_| Ok(vec![place("kakao:1", "37.501", "127.031")]));

        let mut it = item("kakao:1");
        it.tags = Some(vec![
            "핫플".to_string(),
            "가성비 갑".to_string(),
            "X".to_string(),
        ]);

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, vec![it]).await.unwrap();

        // Strict contract: nothing is silently dropped.
        assert_eq!(response.totals.invalid, 1);
        assert_eq!(
            response.invalid[0].details.get("tags").unwrap(),
            "invalid_value"
        );
        assert_eq!(response.totals.saved, 0);
    }

    #[tokio::test]
    async fn test_four_tags_rejected() {
        let mut store = store_with_request();
        store
            .expect_find_places_by_external_ids()
            .returning(|_| Ok(vec![]));

        let mut it = item("kakao:1");
        it.tags = Some(vec![
            "핫플".to_string(),
            "또간집".to_string(),
            "숨은 맛집".to_string(),
            "가성비 갑".to_string(),
        ]);

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, vec![it]).await.unwrap();

        assert_eq!(response.totals.invalid, 1);
        assert_eq!(response.invalid[0].details.get("tags").unwrap(), "max_size_3");
    }

    #[tokio::test]
    async fn test_bucket_totals_cover_whole_batch() {
        let mut store = store_with_request();
        store
            .expect_find_places_by_external_ids()
            .returning(|_| {
                Ok(vec![
                    place("kakao:1", "37.501", "127.031"),
                    place("kakao:2", "37.518", "127.03"),
                ])
            });
        store
            .expect_record_recommendation()
            .returning(|_, _, _| Ok(RecordOutcome::Saved { recommended_count: 3 }));

        let batch = vec![
            item("kakao:1"),            // saved
            item("kakao:2"),            // out of radius
            item("kakao:404"),          // not found
            SubmissionItem {            // invalid
                external_id: None,
                recommender_nickname: Some("추천자".to_string()),
                recommend_message: None,
                image_url: None,
                tags: None,
                guest_id: Some(GUEST.to_string()),
            },
        ];

        let aggregator = RecommendationAggregator::new(Arc::new(store), 800, allowed_tags());
        let response = aggregator.submit(SLUG, batch).await.unwrap();

        let totals = &response.totals;
        assert_eq!(
            totals.saved + totals.conflicts + totals.out_of_radius + totals.not_found + totals.invalid,
            4
        );
        assert_eq!(totals.saved, 1);
        assert_eq!(totals.out_of_radius, 1);
        assert_eq!(totals.not_found, 1);
        assert_eq!(totals.invalid, 1);
    }
}
