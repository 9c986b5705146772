//! Phone number normalization
//!
//! Converts free-form phone numbers into the canonical address format the
//! engine expects: digits plus routing suffix, e.g. "5511999999999@c.us".

use crate::config::Config;

/// Normalize a free-form phone number into a canonical session address.
///
/// Strips every non-digit character, then prepends the configured country
/// code only when the remainder does not already start with it AND has
/// exactly the national-number length. Anything else passes through
/// unprefixed; this is a heuristic matching the engine's expectations, not
/// a validated telecom rule.
pub fn canonical_address(raw: &str, config: &Config) -> String {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if !digits.starts_with(&config.country_code) && digits.len() == config.national_number_len {
        digits = format!("{}{}", config.country_code, digits);
    }

    format!("{}@{}", digits, config.address_suffix)
}
