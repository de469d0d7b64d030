use std::sync::Arc;

use events::EventBus;
use gateway::{FsObjectStore, GenerationClient, ImageGenerator, JudgeClient, ObjectStore, QualityJudge};
use orchestrator::{ExecutorConfig, ExecutorContext};
use server::config::ServerConfig;
use server::state::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let generator: Arc<dyn ImageGenerator> = Arc::new(GenerationClient::new(
        config.generation_api_key.clone(),
        config.generation_api_url.clone(),
    )?);
    let judge: Arc<dyn QualityJudge> = Arc::new(JudgeClient::new(
        config.judge_api_key.clone(),
        config.judge_api_url.clone(),
    )?);
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.storage_root));

    let ctx = Arc::new(ExecutorContext::new(
        pool,
        generator,
        judge,
        store,
        EventBus::new(),
        ExecutorConfig::default(),
    ));
    let state = AppState::new(ctx);
    let app = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
