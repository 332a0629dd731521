//! Address canonicalization before quoting or purchasing a label.
//!
//! The provider geocodes poorly when it receives accented names or the
//! borough-level names people use for Mexico City, so every destination is
//! pushed through [`normalize_address`] first.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonical name sent for any Mexico City alias.
pub const MEXICO_CITY: &str = "Ciudad de Mexico";

const MEXICO_CITY_ALIASES: &[&str] = &[
    "ciudad de mexico",
    "cdmx",
    "df",
    "distrito federal",
    "mexico city",
];

/// The address fields the provider geocodes on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    pub state: String,
    pub city: String,
    pub postal_code: String,
}

impl AddressFields {
    #[must_use]
    pub fn new(state: &str, city: &str, postal_code: &str) -> Self {
        Self {
            state: state.to_string(),
            city: city.to_string(),
            postal_code: postal_code.to_string(),
        }
    }
}

/// Canonicalize state and city for the shipping provider.
///
/// Accents are stripped from `state` and `city`. If either names Mexico City
/// under any known alias, both are forced to [`MEXICO_CITY`]; otherwise the
/// trimmed, accent-free inputs are returned with their case preserved.
#[must_use]
pub fn normalize_address(address: &AddressFields) -> AddressFields {
    let postal_code = address.postal_code.trim().to_string();

    if is_mexico_city(&address.state) || is_mexico_city(&address.city) {
        return AddressFields {
            state: MEXICO_CITY.to_string(),
            city: MEXICO_CITY.to_string(),
            postal_code,
        };
    }

    AddressFields {
        state: strip_diacritics(address.state.trim()),
        city: strip_diacritics(address.city.trim()),
        postal_code,
    }
}

/// Remove combining marks after canonical decomposition ("México" -> "Mexico").
#[must_use]
pub fn strip_diacritics(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn is_mexico_city(name: &str) -> bool {
    let folded = fold(name);
    !folded.is_empty() && MEXICO_CITY_ALIASES.contains(&folded.as_str())
}

/// Lowercase, accent-free, punctuation-free, single-spaced form used for alias matching.
fn fold(input: &str) -> String {
    strip_diacritics(input)
        .to_lowercase()
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cdmx(postal_code: &str) -> AddressFields {
        AddressFields::new(MEXICO_CITY, MEXICO_CITY, postal_code)
    }

    #[test]
    fn test_accented_state_with_borough_city() {
        let input = AddressFields::new("Ciudad de México", "Tlalpan", "14000");
        assert_eq!(normalize_address(&input), cdmx("14000"));
    }

    #[test]
    fn test_abbreviation_in_both_fields() {
        let input = AddressFields::new("CDMX", "cdmx", "06700");
        assert_eq!(normalize_address(&input), cdmx("06700"));
    }

    #[test]
    fn test_distrito_federal_with_empty_city() {
        let input = AddressFields::new("Distrito Federal", "", "");
        assert_eq!(normalize_address(&input), cdmx(""));
    }

    #[test]
    fn test_alias_in_city_only_and_dotted_df() {
        let input = AddressFields::new("  ", "Mexico City", "01000");
        assert_eq!(normalize_address(&input), cdmx("01000"));

        let input = AddressFields::new("D.F.", "Coyoacán", "04000");
        assert_eq!(normalize_address(&input), cdmx("04000"));
    }

    #[test]
    fn test_other_states_keep_case_and_lose_accents() {
        let input = AddressFields::new(" Nuevo León ", "San Pedro Garza García", " 66220 ");
        let expected = AddressFields::new("Nuevo Leon", "San Pedro Garza Garcia", "66220");
        assert_eq!(normalize_address(&input), expected);
    }

    #[test]
    fn test_state_of_mexico_is_not_mexico_city() {
        let input = AddressFields::new("Estado de México", "Toluca", "50000");
        let expected = AddressFields::new("Estado de Mexico", "Toluca", "50000");
        assert_eq!(normalize_address(&input), expected);
    }
}
