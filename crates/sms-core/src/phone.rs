use regex::Regex;
use std::sync::LazyLock;

/// `+` followed by a one to three digit country code and the subscriber part.
static INTERNATIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+(\d{1,3})(.*)$").expect("static regex is valid"));

const FORMATTING: [char; 6] = [' ', '-', '(', ')', '/', '.'];

/// Normalizes a phone number for the router.
///
/// Formatting characters are removed and an international `+` prefix is
/// rewritten to `00` (the router rejects `+`):
///
/// - `+49 151 1234567` → `00491511234567`
/// - `+1 (555) 010-9999` → `0015550109999`
/// - `0151/1234567` → `01511234567`
///
/// A `+` that is not followed by a country code is dropped without adding
/// `00`. Numbers in local format are left alone apart from the stripped
/// punctuation.
pub fn normalize_phone_number(phone_number: &str) -> String {
    let stripped: String = phone_number
        .chars()
        .filter(|c| !FORMATTING.contains(c))
        .collect();

    if !stripped.starts_with('+') {
        return stripped;
    }

    match INTERNATIONAL.captures(&stripped) {
        Some(caps) => format!("00{}{}", &caps[1], &caps[2]),
        None => stripped[1..].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_prefix_becomes_double_zero() {
        assert_eq!(normalize_phone_number("+491234567890"), "00491234567890");
        assert_eq!(normalize_phone_number("+43 664 1234567"), "00436641234567");
        assert_eq!(normalize_phone_number("+1 (555) 010-9999"), "0015550109999");
    }

    #[test]
    fn local_numbers_only_lose_punctuation() {
        assert_eq!(normalize_phone_number("0049 123-456"), "0049123456");
        assert_eq!(normalize_phone_number("0151/123.45.67"), "01511234567");
        assert_eq!(normalize_phone_number("01511234567"), "01511234567");
    }

    #[test]
    fn plus_without_country_code_is_dropped() {
        assert_eq!(normalize_phone_number("+abc"), "abc");
        assert_eq!(normalize_phone_number("+"), "");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_phone_number(""), "");
        assert_eq!(normalize_phone_number(" - "), "");
    }
}
