use reqwest::Client;
use std::time::Duration;

/// Shared outbound client. Only the connect phase is bounded here; every call
/// carries its own wall-clock deadline.
pub fn build_client() -> Client {
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}
