use crate::bulk::resolve::{Resolve, ResolutionOutcome};
use crate::bulk::selector::Selector;
use crate::http::build_client;
use crate::valuation::config::{PROPERTY_LOOKUP_PATH, SIMPLE_VALUE_PATH, ValuationConfig};
use crate::valuation::models::{SimpleValueResponse, Valuation};
use reqwest::{Client, StatusCode, header::HeaderMap};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("missing_api_key")]
    MissingApiKey,
    #[error("invalid_artifact_url")]
    InvalidArtifactUrl,
    #[error("upstream deadline exceeded")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for ValuationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ValuationError::Timeout
        } else {
            ValuationError::Request(err.to_string())
        }
    }
}

/// An upstream reply passed back to callers as-is.
#[derive(Debug)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ValuationClient {
    http: Client,
    config: ValuationConfig,
}

impl ValuationClient {
    pub fn new(config: ValuationConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, ValuationError> {
        self.config
            .api_key
            .as_deref()
            .ok_or(ValuationError::MissingApiKey)
    }

    /// POST `body` to `path` and read the whole reply, all within `deadline`.
    pub async fn forward<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        deadline: Duration,
    ) -> Result<UpstreamReply, ValuationError> {
        let key = self.api_key()?;
        let request = self
            .http
            .post(self.config.endpoint(path))
            .header(API_KEY_HEADER, key)
            .json(body);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(UpstreamReply {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(deadline, exchange).await {
            Ok(result) => result.map_err(ValuationError::from),
            Err(_) => Err(ValuationError::Timeout),
        }
    }

    pub async fn simple_value<B: Serialize + ?Sized>(
        &self,
        body: &B,
        deadline: Duration,
    ) -> Result<UpstreamReply, ValuationError> {
        self.forward(SIMPLE_VALUE_PATH, body, deadline).await
    }

    pub async fn property_lookup<B: Serialize + ?Sized>(
        &self,
        body: &B,
        deadline: Duration,
    ) -> Result<UpstreamReply, ValuationError> {
        self.forward(PROPERTY_LOOKUP_PATH, body, deadline).await
    }

    /// Resolve an artifact reference to a URL on the valuation service. The
    /// credential is only ever sent to the configured base.
    pub fn artifact_url(&self, reference: &str) -> Result<String, ValuationError> {
        let reference = reference.trim();
        if reference.starts_with("/v1/") {
            return Ok(self.config.endpoint(reference));
        }
        let base = &self.config.base_url;
        if reference
            .strip_prefix(base.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
        {
            return Ok(reference.to_string());
        }
        Err(ValuationError::InvalidArtifactUrl)
    }

    /// Start an artifact download. The response body is left unread so callers
    /// can stream it.
    pub async fn fetch_artifact(&self, reference: &str) -> Result<reqwest::Response, ValuationError> {
        let key = self.api_key()?;
        let url = self.artifact_url(reference)?;
        let response = self.http.get(url).header(API_KEY_HEADER, key).send().await?;
        Ok(response)
    }
}

fn classify(reply: UpstreamReply) -> ResolutionOutcome {
    match reply.status {
        status if status.is_success() => {
            if reply.body.trim().is_empty() {
                return ResolutionOutcome::Matched(Valuation::default());
            }
            match serde_json::from_str::<SimpleValueResponse>(&reply.body) {
                Ok(parsed) => ResolutionOutcome::Matched(parsed.into()),
                Err(err) => {
                    debug!(target = "valuation.upstream", error = %err, "simple_value_body_unparseable");
                    ResolutionOutcome::TransportError
                }
            }
        }
        StatusCode::NOT_FOUND => ResolutionOutcome::NoMatch,
        status => ResolutionOutcome::UpstreamError {
            status: status.as_u16(),
        },
    }
}

impl Resolve for ValuationClient {
    fn has_credential(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn resolve(&self, selector: &Selector, deadline: Duration) -> ResolutionOutcome {
        if !selector.is_resolvable() {
            return ResolutionOutcome::InvalidSelector;
        }
        match self.simple_value(selector, deadline).await {
            Ok(reply) => classify(reply),
            Err(ValuationError::Timeout) => ResolutionOutcome::Timeout,
            Err(err) => {
                debug!(target = "valuation.upstream", error = %err, "simple_value_transport_error");
                ResolutionOutcome::TransportError
            }
        }
    }
}
