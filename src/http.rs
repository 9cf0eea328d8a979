//! Small helpers shared by the HTTP-backed clients.

use reqwest::{Client, Url};
use std::time::Duration;

/// User agent prefix sent by every client.
pub(crate) const USER_AGENT: &str = "rusty-rag/0.1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Build a `reqwest` client tagged with a component-specific user agent.
pub(crate) fn build_client(component: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(format!("{USER_AGENT} ({component})"))
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Parse a base URL and drop any trailing slash from its path.
pub(crate) fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string().trim_end_matches('/').to_string())
}

/// Join a base URL and a relative path with exactly one slash.
pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
