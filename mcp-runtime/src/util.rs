use serde_json::Value;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Client for gateways fronted by self-signed certificates.
pub fn insecure_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
