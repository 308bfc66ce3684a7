//! Input validation applied before any write.
//!
//! Every validator returns the normalized value so callers persist exactly
//! what was checked.

use rust_decimal::Decimal;

use crate::errors::DomainError;

pub type ValidationResult<T> = Result<T, DomainError>;

const MAX_TEXT_LEN: usize = 500;
const MONEY_SCALE: u32 = 2;
/// 999 999 999 999.99
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);
pub const MAX_QUANTITY: u32 = 1_000_000;

/// Strips markup tags and NUL bytes, then trims surrounding whitespace.
pub fn sanitize_text(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut inside_tag = false;

    for ch in text.chars() {
        match ch {
            '<' => inside_tag = true,
            '>' if inside_tag => inside_tag = false,
            '\0' => {}
            _ if inside_tag => {}
            _ => output.push(ch),
        }
    }

    output.trim().to_string()
}

pub fn required_text(field: &'static str, value: &str) -> ValidationResult<String> {
    let cleaned = sanitize_text(value);
    if cleaned.is_empty() {
        return Err(DomainError::validation(field, "is required"));
    }
    if cleaned.chars().count() > MAX_TEXT_LEN {
        return Err(DomainError::validation(
            field,
            format!("must be at most {MAX_TEXT_LEN} characters"),
        ));
    }
    Ok(cleaned)
}

pub fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(sanitize_text).filter(|cleaned| !cleaned.is_empty())
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    let local_ok = !local.is_empty()
        && local.chars().all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    if !local_ok {
        return false;
    }

    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    let host_ok =
        !host.is_empty() && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic());

    host_ok && tld_ok
}

/// Returns the lowercased address; uniqueness is case-insensitive.
pub fn validate_email(email: &str) -> ValidationResult<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("email", "is required"));
    }
    if !is_valid_email(trimmed) {
        return Err(DomainError::validation("email", "must look like name@example.com"));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Accepts 10 or 11 digit numbers, optionally prefixed by country code 55.
/// Spaces, dashes, dots, parentheses and `+` are ignored.
pub fn is_valid_phone(phone: &str) -> bool {
    let mut digits = String::with_capacity(phone.len());
    for ch in phone.chars() {
        match ch {
            ' ' | '\t' | '-' | '(' | ')' | '.' | '+' => {}
            c if c.is_ascii_digit() => digits.push(c),
            _ => return false,
        }
    }

    let local = match digits.len() {
        12 | 13 => match digits.strip_prefix("55") {
            Some(rest) => rest,
            None => return false,
        },
        _ => digits.as_str(),
    };

    matches!(local.len(), 10 | 11)
}

pub fn validate_phone(phone: Option<&str>) -> ValidationResult<Option<String>> {
    match optional_text(phone) {
        None => Ok(None),
        Some(phone) if is_valid_phone(&phone) => Ok(Some(phone)),
        Some(_) => Err(DomainError::validation("phone", "must contain 10 or 11 digits")),
    }
}

/// Non-negative amount with at most two decimal places, capped at [`MAX_AMOUNT`].
pub fn validate_amount(field: &'static str, amount: Decimal) -> ValidationResult<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(DomainError::validation(field, "must not be negative"));
    }
    if amount > MAX_AMOUNT {
        return Err(DomainError::validation(field, format!("must not exceed {MAX_AMOUNT}")));
    }
    let normalized = amount.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(DomainError::validation(field, "must have at most two decimal places"));
    }
    Ok(normalized.abs())
}

pub fn validate_quantity(quantity: u32) -> ValidationResult<u32> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity", "must be a positive integer"));
    }
    if quantity > MAX_QUANTITY {
        return Err(DomainError::validation(
            "quantity",
            format!("must not exceed {MAX_QUANTITY}"),
        ));
    }
    Ok(quantity)
}
