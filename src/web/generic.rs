//! Handlers with no request-specific logic.

pub async fn health() -> &'static str {
    "ok"
}
