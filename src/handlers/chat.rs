use crate::{error::ApiError, models::ChatRequest, services::ChatService};
use actix_web::{
    web::{self, Json},
    HttpResponse,
};

pub fn chat_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/chat").route(web::post().to(chat_message)))
        .service(web::resource("/chat/suggestions").route(web::get().to(chat_suggestions)));
}

/// One conversational turn. Anonymous callers get a generated user id so
/// context still works within a session that echoes the id back.
pub async fn chat_message(
    request: Json<ChatRequest>,
    service: web::Data<ChatService>,
) -> Result<HttpResponse, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::InvalidInput("Message cannot be empty".to_string()));
    }

    let user_id = request
        .user_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let reply = service.process_message(&request.message, &user_id).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "user_id": user_id,
        "reply": reply,
    })))
}

pub async fn chat_suggestions(service: web::Data<ChatService>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "suggestions": service.get_suggestions(),
    }))
}
