use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Map, Value};

/// Evidence bundle a summary is generated from.
#[derive(Debug, Clone, Default)]
pub struct SummaryEvidence {
    pub place_name: String,
    pub category_name: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<i32>,
    pub review_snippets: Option<Vec<String>>,
    pub user_tags: Option<Vec<String>>,
}

impl SummaryEvidence {
    /// Evidence as a JSON object holding only non-empty fields; also the
    /// shape attached to responses next to the summary text.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(category) = &self.category_name {
            map.insert("category_name".to_string(), json!(category));
        }
        if let Some(rating) = self.rating {
            map.insert("rating".to_string(), json!(rating));
        }
        if let Some(count) = self.rating_count {
            map.insert("rating_count".to_string(), json!(count));
        }
        if let Some(snippets) = &self.review_snippets {
            if !snippets.is_empty() {
                map.insert("review_snippets".to_string(), json!(snippets));
            }
        }
        if let Some(tags) = &self.user_tags {
            if !tags.is_empty() {
                map.insert("user_tags".to_string(), json!(tags));
            }
        }
        Value::Object(map)
    }
}

/// Produces a one-line natural-language summary for a place.
///
/// Implementations must never fail; `None` is the "no summary" sentinel
/// for any backend problem, disabled flag, or unusable output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryEnricher: Send + Sync {
    async fn summarize(&self, evidence: &SummaryEvidence) -> Option<String>;
}

/// Summary generation backed by an OpenAI-compatible chat endpoint.
pub struct OpenAiSummaryEnricher {
    http_client: HttpClient,
    api_url: String,
    api_key: String,
    model: String,
    enabled: bool,
}

impl OpenAiSummaryEnricher {
    pub fn new(
        http_client: HttpClient,
        api_url: String,
        api_key: String,
        model: String,
        enabled: bool,
    ) -> Self {
        let enabled = enabled && !api_key.is_empty();
        Self {
            http_client,
            api_url,
            api_key,
            model,
            enabled,
        }
    }

    async fn call_backend(&self, evidence: &SummaryEvidence) -> Option<String> {
        let system = "당신은 사용자의 취향을 고려해 장소를 '한 줄'로 요약하는 한국어 어시스턴트입니다. \
                      규칙: (1) 60자 이내, (2) 과장/추측 금지, (3) 제공된 evidence만 사용, \
                      (4) 매장명 언급 금지, (5) 존칭/감탄사 금지. \
                      출력은 JSON {\"summary_text\": \"...\"} 형태만 반환하세요.";

        let mut prompt_evidence = evidence.to_json();
        if let Value::Object(map) = &mut prompt_evidence {
            map.insert("place_name".to_string(), json!(evidence.place_name));
        }

        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "max_tokens": 120,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": json!({ "evidence": prompt_evidence }).to_string() },
            ],
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Summary backend returned error status");
            return None;
        }

        let payload: serde_json::Value = response.json().await.ok()?;
        parse_summary(&payload)
    }
}

/// Pulls the summary line out of a chat-completions payload. Accepts
/// either the requested JSON object or, as a fallback, the raw content.
fn parse_summary(payload: &Value) -> Option<String> {
    let content = payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim();

    if content.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(content) {
        if let Some(text) = parsed.get("summary_text").and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return Some(text.to_string());
            }
        }
    }

    Some(content.to_string())
}

#[async_trait]
impl SummaryEnricher for OpenAiSummaryEnricher {
    async fn summarize(&self, evidence: &SummaryEvidence) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let summary = self.call_backend(evidence).await;
        if summary.is_none() {
            tracing::warn!(place = %evidence.place_name, "Summary generation failed, omitting");
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_json_includes_only_present_fields() {
        let evidence = SummaryEvidence {
            place_name: "somewhere".to_string(),
            category_name: Some("음식점 > 카페".to_string()),
            rating: Some(4.2),
            rating_count: None,
            review_snippets: Some(vec![]),
            user_tags: Some(vec!["핫플".to_string()]),
        };

        let json = evidence.to_json();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.get("category_name").unwrap(), "음식점 > 카페");
        assert_eq!(obj.get("rating").unwrap(), 4.2);
        assert!(obj.get("rating_count").is_none());
        // Empty snippet list is treated as absent.
        assert!(obj.get("review_snippets").is_none());
        assert_eq!(obj.get("user_tags").unwrap(), &json!(["핫플"]));
    }

    #[test]
    fn test_parse_summary_json_content() {
        let payload = json!({
            "choices": [{
                "message": { "content": "{\"summary_text\": \"조용한 분위기의 동네 카페\"}" }
            }]
        });

        assert_eq!(
            parse_summary(&payload),
            Some("조용한 분위기의 동네 카페".to_string())
        );
    }

    #[test]
    fn test_parse_summary_plain_text_fallback() {
        let payload = json!({
            "choices": [{
                "message": { "content": "조용한 분위기의 동네 카페" }
            }]
        });

        assert_eq!(
            parse_summary(&payload),
            Some("조용한 분위기의 동네 카페".to_string())
        );
    }

    #[test]
    fn test_parse_summary_empty_content() {
        let payload = json!({
            "choices": [{ "message": { "content": "   " } }]
        });

        assert_eq!(parse_summary(&payload), None);
    }

    #[tokio::test]
    async fn test_disabled_enricher_returns_none() {
        let enricher = OpenAiSummaryEnricher::new(
            HttpClient::new(),
            "http://localhost:1".to_string(),
            String::new(),
            "gpt-4o-mini".to_string(),
            true,
        );

        let evidence = SummaryEvidence {
            place_name: "somewhere".to_string(),
            ..Default::default()
        };
        assert_eq!(enricher.summarize(&evidence).await, None);
    }
}
