//! Connection authenticator: bearer-credential verification and identity
//! resolution. Token issuance belongs to the hospital's auth service; this
//! module only verifies previously issued credentials.

use crate::core::{AppError, AppState};
use crate::entities::{Chat, ChatParticipant, User};
use crate::repositories::Read;
use axum::extract::State;
use axum::{body::Body, extract::Request, http, http::Response, middleware::Next};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Claims embedded in a credential issued by the hospital auth service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub exp: usize,
    pub iat: usize,
    pub id: i64,
    pub name: String,
    pub role: String,
}

/// Chat loaded by [`chat_access_middleware`], attached as an extension for
/// the member-only routes.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub chat: Chat,
    pub participants: Vec<ChatParticipant>,
}

impl ChatContext {
    pub fn participant(&self, user_id: i64) -> Option<&ChatParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }
}

/// Signs a credential for `user`. The server itself never issues tokens to
/// clients; this exists for tooling and tests.
pub fn encode_jwt(user_id: i64, name: &str, role: &str, secret: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let expire = Duration::hours(24);
    let claims = Claims {
        exp: (now + expire).timestamp() as usize,
        iat: now.timestamp() as usize,
        id: user_id,
        name: name.to_string(),
        role: role.to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        AppError::internal_server_error("Failed to encode token").with_details(e.to_string())
    })
}

/// Verifies signature and expiry, returning the embedded claims.
pub fn decode_jwt(token: &str, secret: &str) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
    decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
}

/// Extracts a single query-string parameter without decoding; bearer tokens
/// and numeric ids are URL-safe already.
fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

/// Authentication middleware for every protected route, including the
/// WebSocket handshake. The credential is taken from the `Authorization`
/// header or, for browser WebSocket clients that cannot set headers, from a
/// `token` query parameter. An optional `user_id` query parameter is the
/// claimed identity and must match the token's embedded identity.
#[instrument(skip(state, req, next))]
pub async fn authentication_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, AppError> {
    let query = req.uri().query().unwrap_or("");

    let token = match req.headers().get(http::header::AUTHORIZATION) {
        Some(header) => {
            let header = header.to_str().map_err(|_| {
                warn!("Malformed authorization header");
                AppError::unauthorized("Malformed authorization header")
            })?;
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| {
                    warn!("Authorization header without Bearer scheme");
                    AppError::unauthorized("Expected a Bearer token")
                })?
                .to_string()
        }
        None => match query_param(query, "token") {
            Some(token) => token.to_string(),
            None => {
                warn!("Missing credential on protected route");
                return Err(AppError::unauthorized("Missing authentication token"));
            }
        },
    };

    let token_data = decode_jwt(&token, &state.jwt_secret).map_err(|e| {
        warn!("Credential rejected: {e}");
        AppError::unauthorized("Invalid or expired token")
    })?;

    // A claimed identity that disagrees with the token is always rejected.
    if let Some(claimed) = query_param(query, "user_id") {
        if claimed.parse::<i64>() != Ok(token_data.claims.id) {
            warn!(
                claimed,
                token_id = token_data.claims.id,
                "Claimed identity does not match credential"
            );
            return Err(AppError::unauthorized(
                "Claimed identity does not match token",
            ));
        }
    }

    // Resolve the identity against the user directory.
    let current_user = state
        .user
        .read(&token_data.claims.id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = token_data.claims.id, "Unknown identity in credential");
            AppError::unauthorized("You are not an authorized user")
        })?;

    debug!(user_id = current_user.user_id, "User authenticated");
    req.extensions_mut().insert(current_user);
    Ok(next.run(req).await)
}

/// Middleware for the `/chat/{chat_id}/...` routes: loads the chat, checks
/// the authenticated caller is one of its participants and attaches a
/// [`ChatContext`] extension for the handlers.
#[instrument(skip(state, req, next))]
pub async fn chat_access_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, AppError> {
    let current_user = req
        .extensions()
        .get::<User>()
        .ok_or_else(|| {
            warn!("User missing from request extensions");
            AppError::unauthorized("User not authenticated")
        })?
        .clone();

    // First numeric path segment is the chat id.
    let chat_id: i64 = req
        .uri()
        .path()
        .split('/')
        .find_map(|segment| segment.parse::<i64>().ok())
        .ok_or_else(|| {
            warn!(path = req.uri().path(), "Chat id not found in path");
            AppError::bad_request("Chat id not found in path")
        })?;

    let (chat, participants) = state
        .chat
        .read_with_participants(&chat_id)
        .await?
        .ok_or_else(|| {
            debug!(chat_id, "Chat not found");
            AppError::not_found("Chat not found")
        })?;

    if !participants.iter().any(|p| p.user_id == current_user.user_id) {
        warn!(
            chat_id,
            user_id = current_user.user_id,
            "Caller is not a participant of the chat"
        );
        return Err(AppError::forbidden("You are not a participant of this chat"));
    }

    req.extensions_mut().insert(ChatContext { chat, participants });
    Ok(next.run(req).await)
}
