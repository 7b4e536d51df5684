use crate::bulk::assemble::{RESULT_COLUMNS, ResultRow};
use std::borrow::Cow;

/// Quote a field only when it contains a comma, a double quote or a newline.
pub fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

pub fn encode_line<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values
        .into_iter()
        .map(escape_field)
        .collect::<Vec<_>>()
        .join(",")
}

/// Header line plus one line per row, `\n`-separated, no trailing newline.
pub fn encode(rows: &[ResultRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(RESULT_COLUMNS.join(","));
    lines.extend(rows.iter().map(|row| encode_line(row.values())));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tricky_row() -> ResultRow {
        ResultRow {
            input_address: "1 Main St, Apt 2".into(),
            input_city: "Say \"Hi\"".into(),
            input_state: "IL".into(),
            full_address: "line one\nline two".into(),
            match_status: "matched".into(),
            estimated_value: "450000".into(),
            ..ResultRow::default()
        }
    }

    #[test]
    fn escaping_rules() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field(""), "");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"x\""), "\"say \"\"x\"\"\"");
        assert_eq!(escape_field("a\nb"), "\"a\nb\"");
    }

    #[test]
    fn header_comes_first_and_has_all_columns() {
        let out = encode(&[]);
        assert_eq!(
            out,
            "input_address,input_city,input_state,input_zip,input_apn,input_fips,match_status,\
estimated_value,price_range_min,price_range_max,confidence_score,fsd_score,\
qvm_value_range_code,qvm_asof_date,last_sale_date,full_address,city,state,zip,apn,fips,\
request_id,pdf_url"
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let rows = vec![tricky_row(), ResultRow::default(), tricky_row()];
        assert_eq!(encode(&rows), encode(&rows));
    }

    #[test]
    fn standard_reader_recovers_original_values() {
        let rows = vec![tricky_row(), ResultRow::default()];
        let out = encode(&rows);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(out.as_bytes());
        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        assert_eq!(headers, RESULT_COLUMNS);
        let decoded: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        assert_eq!(decoded.len(), 2);
        for (record, row) in decoded.iter().zip(&rows) {
            let expected: Vec<String> = row.values().iter().map(|v| v.to_string()).collect();
            assert_eq!(record, &expected);
        }
    }

    #[test]
    fn empty_values_are_zero_characters() {
        let out = encode(&[ResultRow::default()]);
        let last = out.lines().last().unwrap();
        assert_eq!(last, ",".repeat(22));
    }
}
