use actix_web::{web, Scope};

use crate::handlers::{
    chat_config, embeddings_config, health_check, health_options, recommendations_config,
};

/// Configure all routes for the API
pub fn api_routes() -> Scope {
    web::scope("/api")
        .service(health_check)
        .service(health_options)
        .configure(recommendations_config)
        .configure(chat_config)
        .configure(embeddings_config)
}
