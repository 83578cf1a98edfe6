//! Field-level validators: pure functions from a cell value to
//! `Ok`/`Err(message)`. Failures are collected by the error tracker, never
//! propagated as pipeline errors.

use chrono::NaiveDate;
use lazy_regex::regex_is_match;
use rust_decimal::Decimal;

pub type FieldResult = Result<(), String>;

pub const CODE_MIN_LEN: usize = 3;
pub const CODE_MAX_LEN: usize = 50;
pub const NAME_MIN_LEN: usize = 1;
pub const NAME_MAX_LEN: usize = 255;
pub const SHORT_MIN_LEN: usize = 1;
pub const SHORT_MAX_LEN: usize = 50;
pub const QUANTITY_MIN: i64 = 1;
pub const QUANTITY_MAX: i64 = 999_999;

#[must_use]
pub fn price_min() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

#[must_use]
pub fn amount_max() -> Decimal {
    Decimal::from(1_000_000)
}

pub fn not_empty(value: &str, field: &str) -> FieldResult {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

pub fn string_length(value: &str, field: &str, min: usize, max: usize) -> FieldResult {
    let len = value.chars().count();
    if len < min || len > max {
        Err(format!(
            "{field} must be between {min} and {max} characters, got {len}"
        ))
    } else {
        Ok(())
    }
}

pub fn code_pattern(value: &str, field: &str) -> FieldResult {
    if regex_is_match!(r"^[A-Za-z0-9]+$", value) {
        Ok(())
    } else {
        Err(format!("{field} must contain only letters and digits"))
    }
}

pub fn alphanumeric_name(value: &str, field: &str) -> FieldResult {
    if regex_is_match!(r"^[A-Za-z0-9\s&.-]+$", value) {
        Ok(())
    } else {
        Err(format!(
            "{field} must contain only letters, digits, spaces and &.-"
        ))
    }
}

pub fn alphabetic(value: &str, field: &str) -> FieldResult {
    if regex_is_match!(r"^[A-Za-z\s]+$", value) {
        Ok(())
    } else {
        Err(format!("{field} must contain only letters and spaces"))
    }
}

pub fn integer_in_range(value: &str, field: &str, min: i64, max: i64) -> Result<i64, String> {
    let parsed: i64 = value
        .parse()
        .map_err(|_| format!("{field} must be an integer, got `{value}`"))?;
    if parsed < min || parsed > max {
        return Err(format!("{field} must be between {min} and {max}"));
    }
    Ok(parsed)
}

/// Parses a decimal with at most two fractional digits, inclusive range.
pub fn decimal_in_range(
    value: &str,
    field: &str,
    min: Decimal,
    max: Decimal,
) -> Result<Decimal, String> {
    let parsed: Decimal = value
        .parse()
        .map_err(|_| format!("{field} must be a decimal number, got `{value}`"))?;
    if parsed.scale() > 2 {
        return Err(format!(
            "{field} must have at most 2 decimal places, got `{value}`"
        ));
    }
    if parsed < min || parsed > max {
        return Err(format!("{field} must be between {min} and {max}"));
    }
    Ok(parsed)
}

/// Strict `yyyy-MM-dd`, non-lenient.
pub fn date(value: &str, field: &str) -> Result<NaiveDate, String> {
    if value.len() != 10 {
        return Err(format!("{field} must be in yyyy-MM-dd format, got `{value}`"));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field} must be a valid yyyy-MM-dd date, got `{value}`"))
}

// ------ field bindings ------

/// styleCode / skuCode / branch: code pattern plus code length.
pub fn validate_code(value: &str, field: &str) -> FieldResult {
    not_empty(value, field)?;
    code_pattern(value, field)?;
    string_length(value, field, CODE_MIN_LEN, CODE_MAX_LEN)
}

/// brand / category / subCategory / city.
pub fn validate_name(value: &str, field: &str) -> FieldResult {
    not_empty(value, field)?;
    alphanumeric_name(value, field)?;
    string_length(value, field, NAME_MIN_LEN, NAME_MAX_LEN)
}

/// gender: alphabetic, short.
pub fn validate_gender(value: &str, field: &str) -> FieldResult {
    not_empty(value, field)?;
    alphabetic(value, field)?;
    string_length(value, field, SHORT_MIN_LEN, SHORT_MAX_LEN)
}

/// size: alphanumeric name characters, short.
pub fn validate_size(value: &str, field: &str) -> FieldResult {
    not_empty(value, field)?;
    alphanumeric_name(value, field)?;
    string_length(value, field, SHORT_MIN_LEN, SHORT_MAX_LEN)
}

pub fn validate_mrp(value: &str, field: &str) -> Result<Decimal, String> {
    not_empty(value, field)?;
    decimal_in_range(value, field, price_min(), amount_max())
}

pub fn validate_quantity(value: &str, field: &str) -> Result<i64, String> {
    not_empty(value, field)?;
    integer_in_range(value, field, QUANTITY_MIN, QUANTITY_MAX)
}

/// discount / revenue: zero is allowed.
pub fn validate_amount(value: &str, field: &str) -> Result<Decimal, String> {
    not_empty(value, field)?;
    decimal_in_range(value, field, Decimal::ZERO, amount_max())
}

pub fn validate_day(value: &str, field: &str) -> Result<NaiveDate, String> {
    not_empty(value, field)?;
    date(value, field)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_code_rules() {
        assert!(validate_code("STY001", "style").is_ok());
        assert!(validate_code("st", "style").is_err()); // too short
        assert!(validate_code("STY-001", "style").is_err()); // dash
        assert!(validate_code("", "style").is_err());
        assert!(validate_code(&"A".repeat(51), "style").is_err());
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("Tommy & Sons", "brand").is_ok());
        assert!(validate_name("T-Shirts 2.0", "category").is_ok());
        assert!(validate_name("caps_lock", "brand").is_err()); // underscore
        assert!(validate_name("", "brand").is_err());
    }

    #[test]
    fn test_gender_and_size() {
        assert!(validate_gender("Men", "gender").is_ok());
        assert!(validate_gender("Men2", "gender").is_err());
        assert!(validate_size("XL", "size").is_ok());
        assert!(validate_size("32-34", "size").is_ok());
    }

    #[test]
    fn test_quantity_range() {
        assert_eq!(validate_quantity("1", "quantity"), Ok(1));
        assert_eq!(validate_quantity("999999", "quantity"), Ok(999_999));
        assert!(validate_quantity("0", "quantity").is_err());
        assert!(validate_quantity("1000000", "quantity").is_err());
        assert!(validate_quantity("1.5", "quantity").is_err());
        assert!(validate_quantity("ten", "quantity").is_err());
    }

    #[test]
    fn test_decimal_rules() {
        assert_eq!(validate_mrp("499.99", "mrp"), Ok(Decimal::new(49_999, 2)));
        assert!(validate_mrp("0", "mrp").is_err()); // below 0.01
        assert!(validate_amount("0", "discount").is_ok());
        assert!(validate_amount("12.345", "discount").is_err()); // 3 decimals
        assert!(validate_amount("1000000.01", "revenue").is_err());
    }

    #[test]
    fn test_date_rules() {
        assert!(validate_day("2024-02-29", "day").is_ok());
        assert!(validate_day("2023-02-29", "day").is_err()); // not a leap year
        assert!(validate_day("2024-1-01", "day").is_err()); // not zero-padded
        assert!(validate_day("01-01-2024", "day").is_err());
    }
}
