//! Core infrastructure: authentication, configuration, errors, state.

pub mod auth;
pub mod config;
pub mod error;
pub mod state;

pub use auth::{
    ChatContext, Claims, authentication_middleware, chat_access_middleware, decode_jwt, encode_jwt,
};
pub use config::Config;
pub use error::AppError;
pub use state::AppState;
