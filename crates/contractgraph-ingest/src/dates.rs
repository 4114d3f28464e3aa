//! Date recovery for agreement attributes.
//!
//! Only absolute calendar dates are normalized. Relative terms
//! ("3 years from the Effective Date") stay as unparsed text; guessing a
//! date for them would silently corrupt the graph.

use chrono::NaiveDate;
use contractgraph_schema::FieldValue;

/// Formats the extraction model has been observed to emit.
const FORMATS: &[&str] = &[
    "%Y-%m-%d",  // 2021-12-13 (ISO, preferred)
    "%B %d, %Y", // December 13, 2021
    "%b %d, %Y", // Dec 13, 2021
    "%m/%d/%Y",  // 12/13/2021
    "%d %B %Y",  // 13 December 2021
    "%Y/%m/%d",  // 2021/12/13
];

/// Parse an absolute date from a wire string, trying the known formats.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Normalize a date-like field: sentinel/blank → NotSpecified, recoverable
/// absolute date → ISO, anything else → explicitly-unparsed text.
pub fn normalize_date_field(raw: Option<&str>) -> FieldValue {
    let Some(s) = raw else {
        return FieldValue::NotSpecified;
    };
    // Let the sentinel and blank handling live in one place.
    match FieldValue::from_wire(s) {
        FieldValue::Text(text) => match parse_date(&text) {
            Some(d) => FieldValue::Date(d),
            None => FieldValue::Text(text),
        },
        other => other,
    }
}
