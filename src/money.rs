/// Monetary amount in the smallest currency subunit (paise for INR).
/// Money never travels as floating point; every API amount is an `i64`.
pub type Paise = i64;

pub const DEFAULT_CURRENCY: &str = "INR";

/// Render an amount for display. All conversion to display strings
/// happens here and nowhere else.
pub fn format_amount(amount: Paise, currency: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_subunits() {
        assert_eq!(format_amount(500000, "INR"), "5000.00 INR");
        assert_eq!(format_amount(5, "INR"), "0.05 INR");
        assert_eq!(format_amount(-1234, "INR"), "-12.34 INR");
        assert_eq!(format_amount(0, "INR"), "0.00 INR");
    }
}
