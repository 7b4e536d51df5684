use crate::bulk::selector::Selector;
use crate::valuation::models::Valuation;
use std::{future::Future, time::Duration};

/// Result of one attempt to resolve one row. Every variant other than
/// `Matched` is a row-level fault that stays confined to that row.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Matched(Valuation),
    NoMatch,
    UpstreamError { status: u16 },
    Timeout,
    TransportError,
    InvalidSelector,
}

impl ResolutionOutcome {
    /// Short code written to the `match_status` column.
    pub fn match_status(&self) -> String {
        match self {
            ResolutionOutcome::Matched(_) => "matched".to_string(),
            ResolutionOutcome::NoMatch => "no_match".to_string(),
            ResolutionOutcome::UpstreamError { status } => format!("error:{status}"),
            ResolutionOutcome::Timeout => "error:timeout".to_string(),
            ResolutionOutcome::TransportError => "error:unknown".to_string(),
            ResolutionOutcome::InvalidSelector => "error:invalid_selector".to_string(),
        }
    }
}

/// The remote side of row resolution.
///
/// Implementations make exactly one attempt per call and must finish within
/// `deadline`; no retries happen at this layer.
pub trait Resolve: Send + Sync {
    /// Whether the credential needed to reach the service is configured.
    fn has_credential(&self) -> bool;

    fn resolve(
        &self,
        selector: &Selector,
        deadline: Duration,
    ) -> impl Future<Output = ResolutionOutcome> + Send;
}
