//! Input validation helpers shared by the API and background jobs

use rust_decimal::Decimal;

// ============================================================================
// Production and Inventory Validations
// ============================================================================

/// Validate an order line quantity
pub fn validate_order_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity < 1 {
        return Err("Quantity must be at least 1");
    }
    Ok(())
}

/// Validate a progress percentage
pub fn validate_progress(progress: Decimal) -> Result<(), &'static str> {
    if progress < Decimal::ZERO || progress > Decimal::ONE_HUNDRED {
        return Err("Progress must be between 0 and 100");
    }
    Ok(())
}

/// Validate a BOM quantity per finished unit
pub fn validate_bom_quantity(per_unit: Decimal) -> Result<(), &'static str> {
    if per_unit <= Decimal::ZERO {
        return Err("BOM quantity per product must be positive");
    }
    Ok(())
}

/// Validate a material code (2-20 uppercase alphanumeric, dash or underscore)
pub fn validate_material_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 || code.len() > 20 {
        return Err("Material code must be 2-20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err("Material code must be uppercase alphanumeric");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Validate a Philippine mobile number
/// Accepts: 09171234567, 0917-123-4567, +639171234567
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 11 && digits.starts_with("09") {
        return Ok(());
    }
    if digits.len() == 12 && digits.starts_with("639") {
        return Ok(());
    }

    Err("Invalid mobile number format")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_order_quantity() {
        assert!(validate_order_quantity(1).is_ok());
        assert!(validate_order_quantity(0).is_err());
    }

    #[test]
    fn test_validate_progress_bounds() {
        assert!(validate_progress(Decimal::ZERO).is_ok());
        assert!(validate_progress(Decimal::ONE_HUNDRED).is_ok());
        assert!(validate_progress(Decimal::from(101)).is_err());
        assert!(validate_progress(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_validate_material_code() {
        assert!(validate_material_code("PLY-18MM").is_ok());
        assert!(validate_material_code("p").is_err());
        assert!(validate_material_code("ply").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("09171234567").is_ok());
        assert!(validate_phone("+63 917 123 4567").is_ok());
        assert!(validate_phone("12345").is_err());
    }
}
