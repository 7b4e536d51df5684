use std::{env, time::Duration};

pub const DEFAULT_BASE_URL: &str = "https://api.datanestai.net";

pub const SIMPLE_VALUE_PATH: &str = "/v1/report/simple-value";
pub const PROPERTY_LOOKUP_PATH: &str = "/v1/property/lookup";

/// Deadline for the single-record report proxy.
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(65);
/// Deadline for the property lookup proxy.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ValuationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ValuationConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("VALUATION_BASE_URL")
            .or_else(|_| env::var("DATANEST_BASE_URL"))
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = env::var("VALUATION_API_KEY")
            .or_else(|_| env::var("DATANEST_API_KEY"))
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self::new(base_url, api_key)
    }

    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
