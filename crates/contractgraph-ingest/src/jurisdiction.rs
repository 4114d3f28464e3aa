//! Jurisdiction resolution for governing-law clauses.
//!
//! Extraction output frequently names only a state or province
//! ("governed by the laws of the State of New York"). The graph stores
//! countries as first-class nodes, so the well-known US states and Canadian
//! provinces are resolved to their countries here.

pub const UNITED_STATES: &str = "United States";
pub const CANADA: &str = "Canada";

const US_STATES: &[&str] = &[
    "Alabama", "Alaska", "Arizona", "Arkansas", "California", "Colorado", "Connecticut",
    "Delaware", "District of Columbia", "Florida", "Georgia", "Hawaii", "Idaho", "Illinois",
    "Indiana", "Iowa", "Kansas", "Kentucky", "Louisiana", "Maine", "Maryland", "Massachusetts",
    "Michigan", "Minnesota", "Mississippi", "Missouri", "Montana", "Nebraska", "Nevada",
    "New Hampshire", "New Jersey", "New Mexico", "New York", "North Carolina", "North Dakota",
    "Ohio", "Oklahoma", "Oregon", "Pennsylvania", "Rhode Island", "South Carolina",
    "South Dakota", "Tennessee", "Texas", "Utah", "Vermont", "Virginia", "Washington",
    "West Virginia", "Wisconsin", "Wyoming",
];

const CA_PROVINCES: &[&str] = &[
    "Alberta", "British Columbia", "Manitoba", "New Brunswick", "Newfoundland and Labrador",
    "Nova Scotia", "Ontario", "Prince Edward Island", "Quebec", "Saskatchewan",
];

/// Country for a state/province name, if it is one we recognize.
pub fn country_for_state(state: &str) -> Option<&'static str> {
    let trimmed = state.trim();
    if US_STATES.iter().any(|s| s.eq_ignore_ascii_case(trimmed)) {
        Some(UNITED_STATES)
    } else if CA_PROVINCES.iter().any(|p| p.eq_ignore_ascii_case(trimmed)) {
        Some(CANADA)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_states_and_provinces() {
        assert_eq!(country_for_state("New York"), Some(UNITED_STATES));
        assert_eq!(country_for_state("delaware"), Some(UNITED_STATES));
        assert_eq!(country_for_state("Ontario"), Some(CANADA));
    }

    #[test]
    fn countries_are_not_states() {
        assert_eq!(country_for_state("United States"), None);
        assert_eq!(country_for_state("Germany"), None);
    }
}
