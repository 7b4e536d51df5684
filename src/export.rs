use crate::bulk::encode::encode_line;
use serde_json::{Map, Value};

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(nested) => nested.to_string(),
    }
}

/// Export arbitrary flat rows. Columns are the first row's keys in document
/// order; no rows means no output at all.
pub fn rows_to_csv(rows: &[Map<String, Value>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(encode_line(headers.iter().copied()));
    for row in rows {
        let cells: Vec<String> = headers.iter().map(|h| cell(row.get(*h))).collect();
        lines.push(encode_line(cells.iter().map(String::as_str)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn columns_follow_first_row_key_order() {
        let out = rows_to_csv(&rows(json!([
            {"zeta": 1, "alpha": "a,b", "mid": null},
            {"alpha": "say \"hi\"", "zeta": 2.5, "extra": true}
        ])));
        assert_eq!(out, "zeta,alpha,mid\n1,\"a,b\",\n2.5,\"say \"\"hi\"\"\",");
    }

    #[test]
    fn nested_values_are_written_as_json() {
        let out = rows_to_csv(&rows(json!([{"tags": ["x"], "ok": false}])));
        assert_eq!(out, "tags,ok\n\"[\"\"x\"\"]\",false");
    }

    #[test]
    fn no_rows_no_output() {
        assert_eq!(rows_to_csv(&[]), "");
    }
}
