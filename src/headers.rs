use indexmap::IndexMap;
use once_cell::sync::Lazy;
use unicode_normalization::UnicodeNormalization;

use crate::schema::Field;

/// Alias table from normalized spreadsheet header text to the
/// canonical field set. Several aliases may point at one field; the
/// canonical names themselves are present so normalization is
/// idempotent.
static HEADER_ALIASES: Lazy<IndexMap<&'static str, Field>> = Lazy::new(|| {
    IndexMap::from([
        ("card phone number", Field::PhoneNumber),
        ("phone number", Field::PhoneNumber),
        ("card last digits", Field::LastFourDigits),
        ("last four digits", Field::LastFourDigits),
        ("cardholder name", Field::Name),
        ("name", Field::Name),
        ("activation code", Field::ActivationCode),
        ("delivery location", Field::DeliveryAddress),
        ("delivery address", Field::DeliveryAddress),
        ("address title", Field::AddressTitle),
        ("address description", Field::AddressDescription),
        ("onboarding name", Field::OnboardingName),
        ("university", Field::University),
    ])
});

/// Lowercase, trim and NFKC-fold a raw header. Total function; never
/// fails on any input.
pub fn normalize_header(raw: &str) -> String {
    raw.nfkc().collect::<String>().trim().to_lowercase()
}

/// Resolve a raw header to a canonical field, if it is a known alias.
pub fn field_for_header(raw: &str) -> Option<Field> {
    HEADER_ALIASES.get(normalize_header(raw).as_str()).copied()
}

/// Canonical name for a raw header: the aliased field's name when the
/// header is recognized, otherwise the normalized text itself.
pub fn canonical_header(raw: &str) -> String {
    let normalized = normalize_header(raw);
    match HEADER_ALIASES.get(normalized.as_str()) {
        Some(field) => field.canonical().to_string(),
        None => normalized,
    }
}

/// Map a spreadsheet header row positionally onto canonical names.
pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    headers.iter().map(|h| canonical_header(h)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_collapse_to_canonical_fields() {
        assert_eq!(field_for_header("Card Phone Number"), Some(Field::PhoneNumber));
        assert_eq!(field_for_header("phone number"), Some(Field::PhoneNumber));
        assert_eq!(field_for_header(" Card Last Digits "), Some(Field::LastFourDigits));
        assert_eq!(field_for_header("Cardholder Name"), Some(Field::Name));
        assert_eq!(field_for_header("Delivery Location"), Some(Field::DeliveryAddress));
    }

    #[test]
    fn unknown_headers_pass_through_normalized() {
        assert_eq!(canonical_header("  Branch Code "), "branch code");
        assert_eq!(field_for_header("Branch Code"), None);
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Card Phone Number", "NAME", "Branch Code", "University"] {
            let once = canonical_header(raw);
            assert_eq!(canonical_header(&once), once);
        }
    }

    #[test]
    fn header_row_maps_positionally() {
        let headers = vec![
            "Cardholder Name".to_string(),
            "Card Last Digits".to_string(),
            "Branch".to_string(),
        ];
        assert_eq!(
            normalize_headers(&headers),
            vec!["name", "last four digits", "branch"]
        );
    }
}
