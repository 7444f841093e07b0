//! medichat server library. Modules are public so integration tests can
//! drive the router and repositories directly.

pub mod core;
pub mod dtos;
pub mod entities;
pub mod repositories;
pub mod services;
pub mod ws;

pub use core::{AppError, AppState, auth, config};
pub use services::root;

use axum::{
    Router, middleware,
    routing::{any, delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Builds the application router: REST façade plus the WebSocket entry
/// point, everything behind the authentication middleware except the root
/// health probe.
pub fn create_router(state: Arc<AppState>) -> Router {
    use core::auth::authentication_middleware;
    use ws::ws_handler;

    Router::new()
        .route("/", get(root))
        .nest("/chat", configure_chat_routes(state.clone()))
        .route(
            "/ws",
            any(ws_handler).layer(middleware::from_fn_with_state(
                state.clone(),
                authentication_middleware,
            )),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn configure_chat_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use core::auth::{authentication_middleware, chat_access_middleware};
    use services::*;

    // Routes that need authentication only.
    let public_routes = Router::new()
        .route("/search-doctors", get(search_doctors))
        .route("/unread-count", get(unread_count))
        .route("/list", get(list_chats))
        .route("/{recipient_id}", get(open_chat_with))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ));

    // Routes scoped to one chat: authentication plus participant check,
    // which also loads the chat into the request extensions.
    let member_routes = Router::new()
        .route("/{chat_id}/messages", get(get_chat_messages))
        .route("/{chat_id}/send", post(send_message))
        .route("/{chat_id}/read", put(mark_chat_read))
        .route("/{chat_id}/messages/{message_id}", delete(delete_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            chat_access_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ));

    public_routes.merge(member_routes)
}
