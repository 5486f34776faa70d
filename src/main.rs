use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pinboard_api::api::{create_router, AppState};
use pinboard_api::config::Config;
use pinboard_api::db::{create_pool, create_redis_client, Cache, PgStore};
use pinboard_api::services::{
    AutoRecommendationPlanner, KakaoPlaceSearch, OpenAiKeywordExtractor, OpenAiSummaryEnricher,
    RecommendationAggregator, SummaryQueue,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "pinboard_api=info,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(pool));

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client).await;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let search = Arc::new(KakaoPlaceSearch::new(
        http_client.clone(),
        config.kakao_api_url.clone(),
        config.kakao_api_key.clone(),
        cache,
        store.clone(),
        config.station_radius_m,
        config.search_top_n,
    ));

    let keywords = Arc::new(OpenAiKeywordExtractor::new(
        http_client.clone(),
        config.openai_api_url.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.ai_enabled,
    ));

    let summaries = Arc::new(OpenAiSummaryEnricher::new(
        http_client,
        config.openai_api_url.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.ai_enabled,
    ));

    let (summary_queue, summary_worker) = SummaryQueue::new(store.clone(), summaries.clone());

    let state = AppState {
        aggregator: Arc::new(RecommendationAggregator::new(
            store.clone(),
            config.station_radius_m,
            config.allowed_tags.clone(),
        )),
        planner: Arc::new(AutoRecommendationPlanner::new(
            store.clone(),
            search,
            keywords,
            summaries,
        )),
        summary_queue,
        store,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server started");

    axum::serve(listener, app).await?;

    summary_worker.shutdown().await;
    cache_writer.shutdown().await;

    Ok(())
}
