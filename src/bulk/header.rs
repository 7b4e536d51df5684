use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Canonical input fields recognised in an uploaded table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Address,
    City,
    State,
    Zip,
    Apn,
    Fips,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Address => "address",
            Field::City => "city",
            Field::State => "state",
            Field::Zip => "zip",
            Field::Apn => "apn",
            Field::Fips => "fips",
        }
    }

    /// Inverse of [`Field::as_str`].
    pub fn from_canonical(name: &str) -> Option<Field> {
        match name {
            "address" => Some(Field::Address),
            "city" => Some(Field::City),
            "state" => Some(Field::State),
            "zip" => Some(Field::Zip),
            "apn" => Some(Field::Apn),
            "fips" => Some(Field::Fips),
            _ => None,
        }
    }
}

static HEADER_SYNONYMS: Lazy<HashMap<&'static str, Field>> = Lazy::new(|| {
    let table: [(&[&str], Field); 6] = [
        (
            &["address", "address1", "street", "street_address"],
            Field::Address,
        ),
        (&["city", "city_name"], Field::City),
        (&["state", "state_code", "st"], Field::State),
        (
            &["zip", "zip_code", "zipcode", "postal_code", "zip5"],
            Field::Zip,
        ),
        (&["apn", "parcel", "parcel_number"], Field::Apn),
        (&["fips", "fips_code"], Field::Fips),
    ];
    table
        .into_iter()
        .flat_map(|(names, field)| names.iter().map(move |name| (*name, field)))
        .collect()
});

fn clean(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Canonical name for a raw column header. Unknown headers come back
/// lower-cased and trimmed.
pub fn normalize_header(raw: &str) -> String {
    let cleaned = clean(raw);
    match HEADER_SYNONYMS.get(cleaned.as_str()) {
        Some(field) => field.as_str().to_string(),
        None => cleaned,
    }
}
