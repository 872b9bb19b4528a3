use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use axum_extra::extract::WithRejection;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use uuid::Uuid;

use super::error::ApiError;
use crate::auth::AuthUser;
use crate::models::{Conversation, CreateConversationRequest, SendMessageRequest, StoredChatMessage};
use crate::state::AppState;

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(list_conversations).post(create_conversation))
        .route("/conversations/:conversation_id", axum::routing::delete(delete_conversation))
        .route(
            "/conversations/:conversation_id/messages",
            get(list_messages).post(send_message),
        )
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "message": message }).to_string())
}

#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
async fn create_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(request), _): WithRejection<Json<CreateConversationRequest>, ApiError>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let conversation = state
        .chat_service()
        .create_conversation(user.user_id, request.coach)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(state.chat_service().list_conversations(user.user_id).await?))
}

async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<Vec<StoredChatMessage>>, ApiError> {
    let messages = state
        .chat_service()
        .list_messages(user.user_id, conversation_id)
        .await?;
    Ok(Json(messages))
}

async fn delete_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<StatusCode, ApiError> {
    state
        .chat_service()
        .delete_conversation(user.user_id, conversation_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send a message and stream the coach reply as server-sent events
#[tracing::instrument(skip(state, user, request), fields(user_id = %user.user_id))]
async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(request), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    crate::services::chat_service::validate_content(&request.content)?;

    if !state
        .rate_limiter
        .check_rate_limit(&format!("chat:{}", user.user_id))
    {
        return Err(ApiError::RateLimited);
    }

    let chat = state.chat_service();
    let prepared = chat
        .prepare_reply(user.user_id, conversation_id, &request.content)
        .await?;
    let mut llm_stream = state.llm.complete_stream(&prepared.request).await?;
    let user_id = user.user_id;

    let stream = async_stream::stream! {
        let mut reply = String::new();

        while let Some(chunk) = llm_stream.next().await {
            match chunk {
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        reply.push_str(&chunk.delta);
                        yield Ok(Event::default()
                            .event("chunk")
                            .data(json!({ "delta": chunk.delta }).to_string()));
                    }
                    if chunk.is_final {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Coach stream failed: {}", e);
                    yield Ok(error_event("La réponse du coach a été interrompue, réessayez."));
                    return;
                }
            }
        }

        if reply.trim().is_empty() {
            yield Ok(error_event("Le coach n'a pas pu répondre, réessayez."));
            return;
        }

        match chat.finish_reply(user_id, &prepared, &reply).await {
            Ok(message) => {
                yield Ok(Event::default()
                    .event("done")
                    .data(json!({ "message": message }).to_string()));
            }
            Err(e) => {
                tracing::error!("Failed to save coach reply: {}", e);
                yield Ok(error_event("Une erreur interne est survenue"));
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
