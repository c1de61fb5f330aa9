use rag_orchestrator::agents::generator::{GeminiClient, GenerationOrchestrator, GenerativeModel};
use rag_orchestrator::agents::retriever::{SearchClient, SearchEngine};
use rag_orchestrator::api::AppState;
use rag_orchestrator::credentials::{CredentialManager, ServiceAccountKey, ServiceAccountTokenSource};
use rag_orchestrator::feedback::GcsFeedbackStore;
use rag_orchestrator::{app, config, metrics};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("Starting RAG search orchestrator");
    metrics::init();

    let http = reqwest::Client::builder().build()?;

    // Credentials shared by search and feedback storage
    let key = ServiceAccountKey::from_json(&config.gcp_service_account_key)?;
    info!(client_email = %key.client_email, "Service account key loaded");
    let token_source = ServiceAccountTokenSource::new(key, http.clone())?;
    let credentials = Arc::new(CredentialManager::new(Arc::new(token_source)));

    let search = Arc::new(SearchClient::new(
        SearchEngine {
            base_url: config.search_base_url.clone(),
            project_id: config.gcp_project_id.clone(),
            location: config.vertex_search_location.clone(),
            engine_id: config.vertex_search_engine_id.clone(),
        },
        credentials.clone(),
        http.clone(),
        config.retrieval_timeout(),
    ));

    let model = config.gemini_api_key.as_ref().map(|api_key| {
        Arc::new(GeminiClient::new(
            http.clone(),
            config.generative_base_url.clone(),
            api_key.clone(),
            config.gemini_model.clone(),
        )) as Arc<dyn GenerativeModel>
    });
    if model.is_none() {
        warn!("GEMINI_API_KEY is not set; streaming searches will end with a generation error");
    }
    let generator = GenerationOrchestrator::new(
        model,
        config.max_context_chars,
        config.generation_timeout(),
    );

    let feedback = Arc::new(GcsFeedbackStore::new(
        http,
        config.storage_base_url.clone(),
        config.feedback_bucket.clone(),
        credentials.clone(),
    ));

    let state = AppState {
        search,
        generator,
        feedback,
    };
    let routes = app(state, &config.allowed_origins());

    // Start server
    let addr = ([0, 0, 0, 0], config.port);
    let (bound, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })?;
    info!(%bound, "Server listening");

    server.await;

    credentials.discard();
    info!("Server stopped");

    Ok(())
}
