use axum::extract::State;
use axum::Json;
use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};

use super::documents::resolve_document;
use super::{ApiError, CurrentUser, MaybeUser};
use crate::db::models::{ConversationSession, Message, Role};
use crate::llm::{describe_error, ChatCompletion, ChatMessage};
use crate::prompt::{assemble_user_message, build_context, build_messages};
use crate::retrieval;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Defaults to the user's most recent upload
    pub document_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub message: String,
    pub response: String,
    pub response_html: String,
    pub used_context: bool,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
}

/// Render the model's Markdown reply. Raw HTML, block or inline, is shown
/// as text.
pub fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH)
        .map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Call the model; any failure becomes the reply text.
async fn ask_llm(llm: &dyn ChatCompletion, messages: &[ChatMessage]) -> String {
    match llm.complete(messages).await {
        Ok(reply) => {
            tracing::debug!(model = %reply.model, chars = reply.content.len(), "LLM replied");
            reply.content
        }
        Err(e) => {
            tracing::warn!("LLM call failed: {}", e);
            describe_error(&e)
        }
    }
}

/// Top-ranked chunks of the selected document joined into one block, or
/// an empty string when there is nothing to retrieve from.
fn retrieve_context(
    state: &AppState,
    user_id: &str,
    document_id: Option<&str>,
    query: &str,
) -> Result<String, ApiError> {
    let Some(document) = resolve_document(state, user_id, document_id)? else {
        return Ok(String::new());
    };
    let chunks = match state.cache.read(&document.id) {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(doc_id = %document.id, "no retrieval context: {}", e);
            return Ok(String::new());
        }
    };
    let ranked = retrieval::rank(query, &chunks, state.config.top_k);
    tracing::debug!(
        doc_id = %document.id,
        total = chunks.len(),
        selected = ranked.len(),
        "retrieved chunks"
    );
    Ok(build_context(&ranked))
}

/// POST /api/chat — one chat turn.
///
/// Logged-in users get retrieval from their documents and a persisted
/// history; anonymous users get a single stateless reply.
pub async fn chat(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message is required".into()));
    }
    let system_prompt = state.config.llm.system_prompt.as_deref();

    let Some(current) = current else {
        let messages = build_messages(system_prompt, &[], message.clone());
        let response = ask_llm(state.llm.as_ref(), &messages).await;
        return Ok(Json(ChatReply {
            response_html: render_markdown(&response),
            message,
            response,
            used_context: false,
            session_id: None,
        }));
    };

    let user_id = current.user.id.as_str();
    let session = state.db.get_or_create_active_session(user_id)?;
    let history: Vec<ChatMessage> = state
        .db
        .get_messages(&session.id)?
        .into_iter()
        .map(|m| ChatMessage::new(m.role.as_str(), m.content))
        .collect();

    let context = retrieve_context(&state, user_id, req.document_id.as_deref(), &message)?;
    let used_context = !context.is_empty();
    let messages = build_messages(
        system_prompt,
        &history,
        assemble_user_message(&message, &context),
    );

    let response = ask_llm(state.llm.as_ref(), &messages).await;

    state.db.add_message(&session.id, Role::User, &message)?;
    state.db.add_message(&session.id, Role::Assistant, &response)?;
    tracing::debug!(
        session_id = %session.id,
        used_context,
        prior_turns = history.len(),
        "chat turn stored"
    );

    Ok(Json(ChatReply {
        response_html: render_markdown(&response),
        message,
        response,
        used_context,
        session_id: Some(session.id),
    }))
}

/// GET /api/chat/history — messages of the active session.
pub async fn history(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Some(session) = state.db.active_session(&current.user.id)? else {
        return Ok(Json(HistoryResponse {
            session_id: None,
            messages: Vec::new(),
        }));
    };
    let messages = state.db.get_messages(&session.id)?;
    Ok(Json(HistoryResponse {
        session_id: Some(session.id),
        messages,
    }))
}

/// POST /api/sessions — start a fresh conversation.
pub async fn new_session(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ConversationSession>, ApiError> {
    let session = state.db.start_new_session(&current.user.id)?;
    tracing::info!(user = %current.user.username, session_id = %session.id, "started new session");
    Ok(Json(session))
}
