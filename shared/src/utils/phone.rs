//! Phone number utilities

use once_cell::sync::Lazy;
use regex::Regex;

// E.164: '+', non-zero country code digit, 7 to 15 digits in total
static E164_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{6,14}$").unwrap());

/// Normalize a phone number by removing common formatting characters
pub fn normalize_phone_number(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Normalize to E.164, returning `None` when the result is not a valid number
///
/// Formatting characters are dropped and a missing leading `+` is added, so
/// `"1 (555) 123-4567"` becomes `"+15551234567"`.
pub fn to_e164(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let candidate = format!("+{}", digits);
    if E164_REGEX.is_match(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Check if a phone number is already in strict E.164 format
pub fn is_valid_e164(phone: &str) -> bool {
    E164_REGEX.is_match(phone)
}

/// Mask a phone number for logs (e.g., +15****4567)
pub fn mask_phone_number(phone: &str) -> String {
    let normalized = normalize_phone_number(phone);
    if normalized.len() >= 7 {
        format!(
            "{}****{}",
            &normalized[0..3],
            &normalized[normalized.len() - 4..]
        )
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone_number() {
        assert_eq!(normalize_phone_number("+1 (555) 123-4567"), "+15551234567");
        assert_eq!(normalize_phone_number("555.123.4567"), "5551234567");
    }

    #[test]
    fn test_to_e164() {
        assert_eq!(to_e164("+1 (555) 123-4567"), Some("+15551234567".to_string()));
        assert_eq!(to_e164("44 20 7183 8750"), Some("+442071838750".to_string()));
        assert_eq!(to_e164("0123456789"), None); // country code cannot start with 0
        assert_eq!(to_e164("12345"), None); // too short
        assert_eq!(to_e164("+1234567890123456"), None); // too long
        assert_eq!(to_e164("not a number"), None);
    }

    #[test]
    fn test_is_valid_e164() {
        assert!(is_valid_e164("+15551234567"));
        assert!(is_valid_e164("+8613812345678"));
        assert!(!is_valid_e164("15551234567"));
        assert!(!is_valid_e164("+1 555 123 4567"));
    }

    #[test]
    fn test_mask_phone_number() {
        assert_eq!(mask_phone_number("+15551234567"), "+15****4567");
        assert_eq!(mask_phone_number("13812345678"), "138****5678");
        assert_eq!(mask_phone_number("12345"), "****");
    }
}
