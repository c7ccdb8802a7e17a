//! Rendering a query result set as the processor pipeline's CSV dialect
//! (spec §4.H step 2): semicolon delimiter, backslash escape, header row.

use postgres::types::Type;
use postgres::Row;

/// Escape one field per the pipeline's dialect.
pub fn escape_field(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace('\n', "\\n")
}

fn column_value(row: &Row, idx: usize) -> String {
    let ty = row.columns()[idx].type_();
    let rendered = match *ty {
        Type::BOOL => row.get::<_, Option<bool>>(idx).map(|v| v.to_string()),
        Type::INT2 => row.get::<_, Option<i16>>(idx).map(|v| v.to_string()),
        Type::INT4 => row.get::<_, Option<i32>>(idx).map(|v| v.to_string()),
        Type::INT8 => row.get::<_, Option<i64>>(idx).map(|v| v.to_string()),
        Type::FLOAT4 => row.get::<_, Option<f32>>(idx).map(|v| v.to_string()),
        Type::FLOAT8 => row.get::<_, Option<f64>>(idx).map(|v| v.to_string()),
        Type::NUMERIC => row
            .get::<_, Option<rust_decimal::Decimal>>(idx)
            .map(|v| v.to_string()),
        Type::TIMESTAMP => row
            .get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.to_string()),
        Type::TIMESTAMPTZ => row
            .get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map(|v| v.to_string()),
        _ => row.get::<_, Option<String>>(idx),
    };
    rendered.unwrap_or_default()
}

/// Render `rows` (with `column_names` as the header) into the semicolon-
/// delimited, backslash-escaped CSV the processor's input file uses.
pub fn rows_to_csv(column_names: &[String], rows: &[Row]) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(
        &column_names
            .iter()
            .map(|c| escape_field(c))
            .collect::<Vec<_>>()
            .join(";"),
    );
    out.push('\n');

    for row in rows {
        let fields: Vec<String> = (0..column_names.len())
            .map(|idx| escape_field(&column_value(row, idx)))
            .collect();
        out.push_str(&fields.join(";"));
        out.push('\n');
    }

    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_delimiter_and_backslash() {
        assert_eq!(escape_field("a;b"), "a\\;b");
        assert_eq!(escape_field("a\\b"), "a\\\\b");
    }

    #[test]
    fn header_row_is_escaped_like_data() {
        let csv = rows_to_csv(&["id".to_string(), "na;me".to_string()], &[]);
        assert_eq!(String::from_utf8(csv).unwrap(), "id;na\\;me\n");
    }
}
