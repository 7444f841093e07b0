use axum_test::TestServer;
use medichat::core::AppState;
use medichat::ws::dispatch::LogOnlyNotifier;
use medichat::ws::presence::LocalPresence;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_JWT_SECRET: &str = "unit-test-secret-never-deployed";

/// Test state with a zero presence grace so offline transitions are
/// observable without waiting.
pub fn create_test_state(pool: SqlitePool) -> Arc<AppState> {
    Arc::new(AppState::with_collaborators(
        pool,
        TEST_JWT_SECRET.to_string(),
        Arc::new(LocalPresence::new()),
        Arc::new(LogOnlyNotifier),
        Duration::from_secs(0),
    ))
}

pub fn create_test_server(state: Arc<AppState>) -> TestServer {
    let app = medichat::create_router(state);
    TestServer::new(app).expect("Failed to create test server")
}

/// Signed credential for a fixture doctor, the way the hospital auth
/// service would issue one.
pub fn create_test_jwt(user_id: i64, name: &str) -> String {
    medichat::core::encode_jwt(user_id, name, "doctor", TEST_JWT_SECRET)
        .expect("Failed to create JWT token")
}
