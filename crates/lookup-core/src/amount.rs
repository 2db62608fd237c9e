//! Amount codec: ugnot (micro-units) -> GNOT (display unit)

use crate::Amount;

/// Conversion factor between GNOT and ugnot
pub const UGNOT_PER_GNOT: u64 = 1_000_000;

/// Format a ugnot amount as GNOT with exactly six fractional digits.
///
/// Uses integer arithmetic so large balances never lose precision:
/// `47056306` -> `"47.056306"`.
pub fn format_amount(ugnot: Amount) -> String {
    format!("{}.{:06}", ugnot / UGNOT_PER_GNOT, ugnot % UGNOT_PER_GNOT)
}

/// Convert a ugnot amount to a floating-point GNOT value
pub fn ugnot_to_gnot(ugnot: Amount) -> f64 {
    ugnot as f64 / UGNOT_PER_GNOT as f64
}

/// Format a raw textual amount for display.
///
/// Non-numeric input renders as `"NaN"` instead of failing; callers that need
/// a hard error should parse upstream.
pub fn display_amount(raw: &str) -> String {
    match raw.trim().parse::<Amount>() {
        Ok(ugnot) => format_amount(ugnot),
        Err(_) => "NaN".to_string(),
    }
}
