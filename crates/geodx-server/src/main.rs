mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use geodx_adapters::{AdapterRegistry, GlmAdapter, OpenAiAdapter};
use geodx_db::PgGateway;
use geodx_engine::{DiagnosisEngine, EngineConfig};

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(geodx_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = geodx_db::PoolConfig::from_app_config(&config);
    let pool = geodx_db::connect_pool(&config.database_url, pool_config).await?;
    geodx_db::run_migrations(&pool).await?;

    let adapters = build_adapters(&config)?;
    let engine = DiagnosisEngine::new(
        adapters,
        Arc::new(PgGateway::new(pool.clone())),
        EngineConfig::from_app_config(&config),
    );

    let question_set = geodx_core::QuestionSet::load(&config.questions_path)?;
    let default_questions = Arc::new(question_set.texts());

    let _scheduler = scheduler::build_scheduler(engine.clone()).await?;

    let app = build_app(AppState {
        engine,
        pool: Some(pool),
        default_questions,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "geodx server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Register an adapter for every provider with configured credentials.
fn build_adapters(config: &geodx_core::AppConfig) -> anyhow::Result<AdapterRegistry> {
    let mut adapters = AdapterRegistry::new();

    if let Some(key) = &config.openai_api_key {
        adapters.register(Arc::new(OpenAiAdapter::new(
            key,
            &config.openai_base_url,
            config.adapter_timeout_secs,
        )?));
    }
    if let Some(key) = &config.glm_api_key {
        adapters.register(Arc::new(GlmAdapter::new(
            key,
            &config.glm_base_url,
            config.adapter_timeout_secs,
        )?));
    }

    if adapters.providers().is_empty() {
        tracing::warn!(
            "no AI provider credentials configured; every diagnosis task will dead-letter"
        );
    } else {
        tracing::info!(providers = ?adapters.providers(), "registered AI adapters");
    }

    Ok(adapters)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
