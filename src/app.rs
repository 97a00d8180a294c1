use crate::{
    config::Config,
    error::Result,
    ml::{EmbeddingGenerator, GenreClassifier, HuggingFaceEncoder, IntentMatcher, VectorCache},
    routes::api_routes,
    services::{ChatService, RecommendationService},
    store::{BookStore, SqliteBookStore},
};
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

pub struct Application {
    port: u16,
    host: String,
    config: Config,
}

impl Application {
    /// Create a new application instance
    pub fn new(config: &Config) -> Self {
        Self {
            port: config.port,
            host: config.host.clone(),
            config: config.clone(),
        }
    }

    /// Build and run the server
    pub async fn run(&self) -> Result<()> {
        // Always bind to 0.0.0.0 for Docker/Render compatibility
        let bind_address = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&bind_address)?;
        info!("Starting server at http://{}:{}", self.host, self.port);

        self.run_with_listener(listener).await
    }

    /// Run the server with a specific TCP listener
    /// This is useful for testing where we want to use a random port
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let store: Arc<dyn BookStore> = Arc::new(
            SqliteBookStore::connect(&self.config.database_url)
                .await
                .context("Failed to open the book database")?,
        );

        let encoder = Arc::new(
            HuggingFaceEncoder::new(&self.config)
                .context("Failed to initialize sentence encoder")?,
        );

        // A cold model is the slowest first request; warm it now but keep
        // serving if the inference API is temporarily down.
        if let Err(e) = encoder.prewarm().await {
            warn!("Model prewarm failed, will retry on first request: {}", e);
        }

        let cache = Arc::new(VectorCache::load(&self.config.vector_cache_path));
        let generator = Arc::new(EmbeddingGenerator::new(encoder.clone(), cache));
        let genres = Arc::new(GenreClassifier::new(encoder.clone()));

        let recommendation_service = Arc::new(RecommendationService::new(
            store.clone(),
            generator,
            genres,
            self.config.recommendation.clone(),
        ));
        let indexed = recommendation_service
            .load_index()
            .await
            .context("Failed to load the embedding index")?;
        if indexed == 0 {
            warn!("Embedding index is empty; POST /api/embeddings/rebuild to build it");
        }

        let intent_matcher = Arc::new(IntentMatcher::new(
            encoder,
            self.config.context_max_users,
            Duration::from_secs(self.config.context_ttl_secs),
        ));
        let chat_service = web::Data::new(ChatService::new(
            intent_matcher,
            recommendation_service.clone(),
            store,
        ));
        let recommendation_service = web::Data::from(recommendation_service);

        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header();

            App::new()
                .wrap(cors)
                .wrap(Logger::default())
                .app_data(recommendation_service.clone())
                .app_data(chat_service.clone())
                .service(api_routes())
        })
        .listen(listener)?
        .run()
        .await?;

        Ok(())
    }
}
