use crate::bulk::header::{Field, normalize_header};
use crate::bulk::pipeline::BatchError;
use tracing::{debug, warn};

/// One uploaded row, keyed by canonical field. Values are trimmed; a field is
/// `None` when no column mapped to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRow {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub apn: Option<String>,
    pub fips: Option<String>,
}

impl InputRow {
    pub fn get(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::Address => &self.address,
            Field::City => &self.city,
            Field::State => &self.state,
            Field::Zip => &self.zip,
            Field::Apn => &self.apn,
            Field::Fips => &self.fips,
        };
        value.as_deref()
    }

    pub fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Address => &mut self.address,
            Field::City => &mut self.city,
            Field::State => &mut self.state,
            Field::Zip => &mut self.zip,
            Field::Apn => &mut self.apn,
            Field::Fips => &mut self.fips,
        };
        *slot = Some(value);
    }

    /// The field value or an empty string, for echoing into output.
    pub fn echo(&self, field: Field) -> String {
        self.get(field).unwrap_or_default().to_string()
    }
}

/// Parse an uploaded delimited table into input rows.
///
/// Reading stops as soon as more than `max_rows` data rows have been seen, so
/// an oversized upload is rejected without materialising every row.
pub fn parse_table(raw: &[u8], max_rows: usize) -> Result<Vec<InputRow>, BatchError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| BatchError::invalid_input("parse", "upload is not valid UTF-8"))?;
    if text.trim().is_empty() {
        return Err(BatchError::invalid_input("parse", "empty input"));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let names: Vec<String> = reader
        .headers()
        .map_err(map_csv_error)?
        .iter()
        .map(normalize_header)
        .collect();
    debug!(target = "valuation.bulk", headers = ?names, "normalized headers");
    let columns: Vec<Option<Field>> = names.iter().map(|n| Field::from_canonical(n)).collect();
    warn_on_unusable_headers(&columns);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(map_csv_error)?;
        if rows.len() == max_rows {
            return Err(over_limit(max_rows));
        }
        let mut row = InputRow::default();
        for (column, value) in columns.iter().zip(record.iter()) {
            if let Some(field) = column {
                row.set(*field, value.trim().to_string());
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(BatchError::invalid_input("parse", "empty input"));
    }
    Ok(rows)
}

pub fn over_limit(max_rows: usize) -> BatchError {
    BatchError::invalid_input(
        "row_limit",
        format!("over limit: uploads are limited to {max_rows} rows, please upload a smaller file"),
    )
}

fn warn_on_unusable_headers(columns: &[Option<Field>]) {
    let has = |field: Field| columns.contains(&Some(field));
    let address_set = [Field::Address, Field::City, Field::State, Field::Zip]
        .into_iter()
        .all(has);
    let parcel_set = has(Field::Apn) && has(Field::Fips);
    if !address_set && !parcel_set {
        warn!(
            target = "valuation.bulk",
            "uploaded headers cover neither address,city,state,zip nor apn,fips"
        );
    }
}

fn map_csv_error(err: csv::Error) -> BatchError {
    let row = err.position().map(|p| p.record()).unwrap_or_default();
    BatchError::invalid_input("parse", format!("invalid csv near record {row}: {err}"))
}
