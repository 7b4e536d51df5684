use crate::bulk::table::InputRow;
use serde::Serialize;
use serde_with::skip_serializing_none;

/// Street-address identification. `zip` is passed through as given.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSelector {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: Option<String>,
}

/// Parcel identification by assessor parcel number and county FIPS code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParcelSelector {
    pub apn: String,
    pub fips: String,
}

/// How a row is identified to the valuation service. Serialises to the
/// request body the service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Selector {
    Address(AddressSelector),
    Parcel(ParcelSelector),
    #[serde(skip)]
    Unresolvable,
}

impl Selector {
    pub fn is_resolvable(&self) -> bool {
        !matches!(self, Selector::Unresolvable)
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Address triple first, then parcel pair, else unresolvable. Emptiness after
/// trimming is the only test.
pub fn resolve(row: &InputRow) -> Selector {
    if let (Some(address), Some(city), Some(state)) =
        (present(&row.address), present(&row.city), present(&row.state))
    {
        return Selector::Address(AddressSelector {
            address,
            city,
            state,
            zip: row.zip.clone(),
        });
    }
    if let (Some(apn), Some(fips)) = (present(&row.apn), present(&row.fips)) {
        return Selector::Parcel(ParcelSelector { apn, fips });
    }
    Selector::Unresolvable
}
