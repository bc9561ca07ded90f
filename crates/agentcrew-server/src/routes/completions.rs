//! Agent completion routes: forwards a prompt into the group chat.
//!
//! `isStreaming=false` returns a JSON array of agent messages.
//! `isStreaming=true` returns NDJSON, one fragment per line.

use std::convert::Infallible;
use std::sync::Arc;

use agentcrew_chat::{validate_chat_history, AgentCompletionRequest, ChatMessage};
use agentcrew_core::Result;
use agentcrew_runtime::{CancellationToken, FragmentStream, GroupChat};
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio_stream::StreamExt;
use tracing::{error, info, info_span, Instrument};

use crate::error::ApiError;
use crate::state::AppState;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/agent/completions", post(complete))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AgentCompletionRequest>,
) -> std::result::Result<Response, ApiError> {
    validate_chat_history(&req.chat_history)?;

    let request_id = uuid::Uuid::new_v4();
    info!(
        %request_id,
        streaming = req.is_streaming,
        history = req.chat_history.len(),
        "Agent completion request"
    );

    let mut chat = GroupChat::new(state.group_chat.clone(), state.model.clone());
    chat.add_messages(req.chat_history.into_vec());
    chat.add_message(ChatMessage::user(req.prompt));

    let cancel = CancellationToken::new();

    if req.is_streaming {
        return Ok(stream_response(chat, cancel, request_id));
    }

    let messages = collect_messages(chat, cancel)
        .instrument(info_span!("completion", %request_id))
        .await?;
    Ok(Json(messages).into_response())
}

async fn collect_messages(chat: GroupChat, cancel: CancellationToken) -> Result<Vec<ChatMessage>> {
    let mut stream = chat.invoke(cancel);
    let mut messages = Vec::new();
    while let Some(message) = stream.next().await {
        messages.push(message?);
    }
    info!("Group chat produced {} messages", messages.len());
    Ok(messages)
}

/// Serve fragments as NDJSON.
///
/// The body stream owns a drop guard for `cancel`: when the client goes
/// away axum drops the body, which cancels the group chat.
fn stream_response(chat: GroupChat, cancel: CancellationToken, request_id: uuid::Uuid) -> Response {
    let guard = cancel.clone().drop_guard();
    let fragments = chat.invoke_streaming(cancel);
    let body = Body::from_stream(ndjson_lines(fragments, guard, request_id));

    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response()
}

fn ndjson_lines(
    mut fragments: FragmentStream,
    guard: tokio_util::sync::DropGuard,
    request_id: uuid::Uuid,
) -> impl futures::Stream<Item = std::result::Result<String, Infallible>> + Send {
    async_stream::stream! {
        let _guard = guard;
        let mut count = 0usize;

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => match serde_json::to_string(&fragment) {
                    Ok(mut line) => {
                        line.push('\n');
                        count += 1;
                        yield Ok(line);
                    }
                    Err(e) => error!("Failed to encode fragment: {}", e),
                },
                Err(e) => {
                    error!(%request_id, "Group chat failed mid-stream: {}", e);
                    break;
                }
            }
        }

        info!(%request_id, "Streamed {} fragments", count);
    }
}
