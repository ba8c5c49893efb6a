use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::{EditMessageRequest, RegisterParticipantRequest, SendMessageRequest};
use domain::{Message, Participant};

use crate::{error::ApiError, state::AppState};

/// 操作者身份所在的请求头
const ACTOR_HEADER: &str = "user";

#[derive(Debug, Deserialize)]
struct ListMessagesQuery {
    limit: Option<String>,
}

pub fn router(state: AppState, cors_permissive: bool) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route(
            "/participants",
            post(register_participant).get(list_participants),
        )
        .route("/status", post(heartbeat))
        .route("/messages", post(send_message).get(list_messages))
        .route("/messages/{id}", put(edit_message).delete(delete_message))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

fn actor(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_participant(
    State(state): State<AppState>,
    payload: Result<Json<RegisterParticipantRequest>, JsonRejection>,
) -> Result<(StatusCode, &'static str), ApiError> {
    let Json(request) = payload?;
    state.participant_service.register(request).await?;
    Ok((StatusCode::CREATED, "OK"))
}

async fn list_participants(
    State(state): State<AppState>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    let participants = state.participant_service.list().await?;
    Ok(Json(participants))
}

async fn heartbeat(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    state.participant_service.heartbeat(actor(&headers)).await?;
    Ok(StatusCode::OK)
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let Json(request) = payload?;
    let message = state
        .message_service
        .create(actor(&headers), request)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .message_service
        .list(actor(&headers), query.limit.as_deref())
        .await?;
    Ok(Json(messages))
}

async fn edit_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<EditMessageRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(request) = payload?;
    let message = state
        .message_service
        .edit(&id, actor(&headers), request)
        .await?;
    Ok(Json(message))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    state.message_service.delete(&id, actor(&headers)).await?;
    Ok(StatusCode::OK)
}
