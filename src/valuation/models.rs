use serde::Deserialize;
use std::fmt;

/// A nullable scalar as returned by the valuation service. Numbers keep their
/// wire representation so they stringify without locale or float noise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
    Flag(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
            Scalar::Flag(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValuationFields {
    pub estimated_value: Option<Scalar>,
    pub price_range_min: Option<Scalar>,
    pub price_range_max: Option<Scalar>,
    pub confidence_score: Option<Scalar>,
    pub fsd_score: Option<Scalar>,
    pub qvm_value_range_code: Option<Scalar>,
    pub qvm_asof_date: Option<Scalar>,
    pub last_sale_date: Option<Scalar>,
    pub full_address: Option<Scalar>,
    pub city: Option<Scalar>,
    pub state: Option<Scalar>,
    pub zip: Option<Scalar>,
    pub apn: Option<Scalar>,
    pub fips: Option<Scalar>,
    pub request_id: Option<Scalar>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Artifacts {
    pub pdf_url: Option<String>,
}

/// Body of `POST /v1/report/simple-value`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimpleValueResponse {
    pub data: Option<ValuationFields>,
    pub artifacts: Option<Artifacts>,
}

/// A matched valuation: the `data` fields plus the artifact link, flattened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Valuation {
    pub fields: ValuationFields,
    pub pdf_url: Option<String>,
}

impl From<SimpleValueResponse> for Valuation {
    fn from(value: SimpleValueResponse) -> Self {
        Self {
            fields: value.data.unwrap_or_default(),
            pdf_url: value.artifacts.and_then(|a| a.pdf_url),
        }
    }
}
