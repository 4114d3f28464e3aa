//! Three-way value model for agreement attributes.
//!
//! The extraction collaborator hands us strings that are an absolute date,
//! a free-text term ("3 years from the Effective Date"), or the literal
//! sentinel "Not specified". The normalizer decides which; downstream code
//! never has to re-guess.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The sentinel the extraction prompt instructs the model to emit.
pub const NOT_SPECIFIED: &str = "Not specified";

/// An agreement attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldValue {
    /// An absolute date, recovered and normalized to ISO-8601.
    Date(NaiveDate),
    /// Free text that could not be resolved to an absolute date.
    /// Explicitly unparsed; never a silent guess.
    Text(String),
    /// The source document did not specify this attribute.
    NotSpecified,
}

impl FieldValue {
    /// Parse a wire string. Absolute ISO dates become [`FieldValue::Date`];
    /// the sentinel (or an empty string) becomes [`FieldValue::NotSpecified`];
    /// anything else is carried as unparsed text.
    pub fn from_wire(s: &str) -> FieldValue {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_SPECIFIED) {
            return FieldValue::NotSpecified;
        }
        match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            Ok(d) => FieldValue::Date(d),
            Err(_) => FieldValue::Text(trimmed.to_string()),
        }
    }

    pub fn is_specified(&self) -> bool {
        !matches!(self, FieldValue::NotSpecified)
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::NotSpecified
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Text(t) => f.write_str(t),
            FieldValue::NotSpecified => f.write_str(NOT_SPECIFIED),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::from_wire(&s)
    }
}

impl From<FieldValue> for String {
    fn from(v: FieldValue) -> String {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_dates_are_recognized() {
        assert_eq!(
            FieldValue::from_wire("2021-12-13"),
            FieldValue::Date(NaiveDate::from_ymd_opt(2021, 12, 13).unwrap())
        );
    }

    #[test]
    fn sentinel_and_blank_map_to_not_specified() {
        assert_eq!(FieldValue::from_wire("Not specified"), FieldValue::NotSpecified);
        assert_eq!(FieldValue::from_wire("not Specified"), FieldValue::NotSpecified);
        assert_eq!(FieldValue::from_wire("   "), FieldValue::NotSpecified);
    }

    #[test]
    fn free_text_is_preserved_verbatim() {
        assert_eq!(
            FieldValue::from_wire("3 years from the Effective Date"),
            FieldValue::Text("3 years from the Effective Date".into())
        );
    }

    #[test]
    fn display_round_trips_the_wire_form() {
        for s in ["2021-12-13", "Not specified", "perpetual"] {
            assert_eq!(FieldValue::from_wire(s).to_string(), s);
        }
    }
}
