use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::json;

/// Fallback query when a message yields nothing usable.
pub const DEFAULT_KEYWORD: &str = "카페";

const MAX_KEYWORDS: usize = 2;

/// Extracts up to two place-search keywords from free text.
///
/// Implementations must never fail: any backend problem degrades to the
/// deterministic heuristic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract(&self, message: &str) -> Vec<String>;
}

/// Keyword extraction backed by an OpenAI-compatible chat endpoint.
pub struct OpenAiKeywordExtractor {
    http_client: HttpClient,
    api_url: String,
    api_key: String,
    model: String,
    enabled: bool,
}

impl OpenAiKeywordExtractor {
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

    async fn call_backend(&self, message: &str) -> Option<Vec<String>> {
        let system = "너는 한국어 문장에서 '장소 검색용 키워드'를 최대 2개 짧게 추출하는 도우미야. \
                      규칙: (1) 1~2개, (2) 너무 일반적인 단어 제외(예: 장소, 추천), \
                      (3) 상호명이나 카테고리 단어 위주로, (4) 출력은 JSON {\"keywords\":[\"...\",\"...\"]} 만.";

        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "max_tokens": 60,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": message.trim() },
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
            tracing::warn!(status = %response.status(), "Keyword extraction backend returned error status");
            return None;
        }

        let payload: serde_json::Value = response.json().await.ok()?;
        parse_keywords(&payload)
    }
}

/// Pulls `{"keywords": [...]}` out of a chat-completions payload.
fn parse_keywords(payload: &serde_json::Value) -> Option<Vec<String>> {
    let content = payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?;

    let parsed: serde_json::Value = serde_json::from_str(content.trim()).ok()?;
    let list = parsed.get("keywords")?.as_array()?;

    let mut keywords = Vec::new();
    for value in list {
        let Some(s) = value.as_str() else { continue };
        let s = s.trim();
        if !s.is_empty() && !keywords.iter().any(|k| k == s) {
            keywords.push(s.to_string());
        }
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }

    Some(keywords)
}

/// Deterministic fallback: a tiny marker table first, then the first two
/// plausible whitespace tokens, then the default keyword.
pub fn heuristic_keywords(message: &str) -> Vec<String> {
    let message = message.trim();
    if message.is_empty() {
        return vec![DEFAULT_KEYWORD.to_string()];
    }

    const CAFE_MARKERS: &[&str] = &["카페", "커피", "디저트", "빵", "베이커리"];
    if CAFE_MARKERS.iter().any(|m| message.contains(m)) {
        return vec![DEFAULT_KEYWORD.to_string()];
    }

    let mut keywords = Vec::new();
    for token in message.split_whitespace() {
        let token = token.trim();
        let len = token.chars().count();
        if !(2..=15).contains(&len) {
            continue;
        }
        keywords.push(token.to_string());
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }

    if keywords.is_empty() {
        keywords.push(DEFAULT_KEYWORD.to_string());
    }
    keywords
}

#[async_trait]
impl KeywordExtractor for OpenAiKeywordExtractor {
    async fn extract(&self, message: &str) -> Vec<String> {
        if message.trim().is_empty() || !self.enabled {
            return heuristic_keywords(message);
        }

        match self.call_backend(message).await {
            Some(keywords) if !keywords.is_empty() => keywords,
            _ => {
                tracing::warn!("Keyword extraction fell back to heuristic");
                heuristic_keywords(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heuristic_empty_message_uses_default() {
        assert_eq!(heuristic_keywords(""), vec![DEFAULT_KEYWORD.to_string()]);
        assert_eq!(heuristic_keywords("   "), vec![DEFAULT_KEYWORD.to_string()]);
    }

    #[test]
    fn test_heuristic_cafe_marker_short_circuits() {
        assert_eq!(
            heuristic_keywords("조용한 커피 마실 곳 찾아요"),
            vec![DEFAULT_KEYWORD.to_string()]
        );
    }

    #[test]
    fn test_heuristic_takes_first_two_tokens() {
        assert_eq!(
            heuristic_keywords("파스타 맛집 알려주세요 제발"),
            vec!["파스타".to_string(), "맛집".to_string()]
        );
    }

    #[test]
    fn test_heuristic_skips_out_of_range_tokens() {
        // Single-char tokens are skipped.
        assert_eq!(
            heuristic_keywords("a 파스타 b 와인바"),
            vec!["파스타".to_string(), "와인바".to_string()]
        );
    }

    #[test]
    fn test_parse_keywords_from_chat_payload() {
        let payload = json!({
            "choices": [{
                "message": {
                    "content": "{\"keywords\": [\"파스타\", \"와인바\"]}"
                }
            }]
        });

        assert_eq!(
            parse_keywords(&payload),
            Some(vec!["파스타".to_string(), "와인바".to_string()])
        );
    }

    #[test]
    fn test_parse_keywords_caps_and_dedups() {
        let payload = json!({
            "choices": [{
                "message": {
                    "content": "{\"keywords\": [\"카페\", \"카페\", \"빵집\", \"셋째\"]}"
                }
            }]
        });

        assert_eq!(
            parse_keywords(&payload),
            Some(vec!["카페".to_string(), "빵집".to_string()])
        );
    }

    #[test]
    fn test_parse_keywords_malformed_content() {
        let payload = json!({
            "choices": [{
                "message": { "content": "not json at all" }
            }]
        });

        assert_eq!(parse_keywords(&payload), None);
    }

    #[tokio::test]
    async fn test_disabled_extractor_uses_heuristic() {
        let extractor = OpenAiKeywordExtractor::new(
            HttpClient::new(),
            "http://localhost:1".to_string(),
            String::new(),
            "gpt-4o-mini".to_string(),
            true,
        );

        // Empty key disables the backend entirely; no network call happens.
        let keywords = extractor.extract("파스타 맛집 찾는 중").await;
        assert_eq!(keywords, vec!["파스타".to_string(), "맛집".to_string()]);
    }
}
