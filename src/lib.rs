//! # pdf-chat
//!
//! Authenticated chat with an OpenAI-compatible LLM, grounded in the user's
//! uploaded PDF. An upload is split into overlapping text chunks and cached
//! on disk; every chat turn ranks those chunks lexically against the message
//! and wraps the best ones around it before calling the model.
//!
//! - [`doc_processor`] - PDF text extraction, chunking, chunk cache files
//! - [`retrieval`] - word-overlap + character-similarity chunk ranking
//! - [`prompt`] - context block and message assembly
//! - [`llm`] - chat-completion trait and OpenAI-compatible client
//! - [`db`] - SQLite persistence for users, documents, sessions, messages
//! - [`auth`] - password hashing and login-token transport
//! - [`api`] - axum handlers

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod doc_processor;
pub mod llm;
pub mod prompt;
pub mod retrieval;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the HTTP router.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/auth/register", post(api::auth::register))
        .route("/api/auth/login", post(api::auth::login))
        .route("/api/auth/logout", post(api::auth::logout))
        .route("/api/chat", post(api::chat::chat))
        .route("/api/chat/history", get(api::chat::history))
        .route("/api/sessions", post(api::chat::new_session))
        .route(
            "/api/documents",
            get(api::documents::list_documents).post(api::documents::upload_document),
        )
        .route("/api/documents/{id}", delete(api::documents::delete_document))
        .route(
            "/api/retrieval/preview",
            post(api::documents::preview_retrieval),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
