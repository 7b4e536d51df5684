use crate::bulk::header::Field;
use crate::bulk::resolve::ResolutionOutcome;
use crate::bulk::table::InputRow;
use crate::valuation::models::Scalar;

/// Output columns, in order.
pub const RESULT_COLUMNS: [&str; 23] = [
    "input_address",
    "input_city",
    "input_state",
    "input_zip",
    "input_apn",
    "input_fips",
    "match_status",
    "estimated_value",
    "price_range_min",
    "price_range_max",
    "confidence_score",
    "fsd_score",
    "qvm_value_range_code",
    "qvm_asof_date",
    "last_sale_date",
    "full_address",
    "city",
    "state",
    "zip",
    "apn",
    "fips",
    "request_id",
    "pdf_url",
];

/// One output row. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRow {
    pub input_address: String,
    pub input_city: String,
    pub input_state: String,
    pub input_zip: String,
    pub input_apn: String,
    pub input_fips: String,
    pub match_status: String,
    pub estimated_value: String,
    pub price_range_min: String,
    pub price_range_max: String,
    pub confidence_score: String,
    pub fsd_score: String,
    pub qvm_value_range_code: String,
    pub qvm_asof_date: String,
    pub last_sale_date: String,
    pub full_address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub apn: String,
    pub fips: String,
    pub request_id: String,
    pub pdf_url: String,
}

impl ResultRow {
    /// Values in [`RESULT_COLUMNS`] order.
    pub fn values(&self) -> [&str; 23] {
        [
            self.input_address.as_str(),
            self.input_city.as_str(),
            self.input_state.as_str(),
            self.input_zip.as_str(),
            self.input_apn.as_str(),
            self.input_fips.as_str(),
            self.match_status.as_str(),
            self.estimated_value.as_str(),
            self.price_range_min.as_str(),
            self.price_range_max.as_str(),
            self.confidence_score.as_str(),
            self.fsd_score.as_str(),
            self.qvm_value_range_code.as_str(),
            self.qvm_asof_date.as_str(),
            self.last_sale_date.as_str(),
            self.full_address.as_str(),
            self.city.as_str(),
            self.state.as_str(),
            self.zip.as_str(),
            self.apn.as_str(),
            self.fips.as_str(),
            self.request_id.as_str(),
            self.pdf_url.as_str(),
        ]
    }
}

fn text(value: &Option<Scalar>) -> String {
    value.as_ref().map(Scalar::to_string).unwrap_or_default()
}

pub fn assemble(input: &InputRow, outcome: &ResolutionOutcome) -> ResultRow {
    let mut row = ResultRow {
        input_address: input.echo(Field::Address),
        input_city: input.echo(Field::City),
        input_state: input.echo(Field::State),
        input_zip: input.echo(Field::Zip),
        input_apn: input.echo(Field::Apn),
        input_fips: input.echo(Field::Fips),
        match_status: outcome.match_status(),
        ..ResultRow::default()
    };

    if let ResolutionOutcome::Matched(valuation) = outcome {
        let data = &valuation.fields;
        row.estimated_value = text(&data.estimated_value);
        row.price_range_min = text(&data.price_range_min);
        row.price_range_max = text(&data.price_range_max);
        row.confidence_score = text(&data.confidence_score);
        row.fsd_score = text(&data.fsd_score);
        row.qvm_value_range_code = text(&data.qvm_value_range_code);
        row.qvm_asof_date = text(&data.qvm_asof_date);
        row.last_sale_date = text(&data.last_sale_date);
        row.full_address = text(&data.full_address);
        row.city = text(&data.city);
        row.state = text(&data.state);
        row.zip = text(&data.zip);
        row.apn = text(&data.apn);
        row.fips = text(&data.fips);
        row.request_id = text(&data.request_id);
        row.pdf_url = valuation.pdf_url.clone().unwrap_or_default();
    }

    row
}
