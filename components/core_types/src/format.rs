//! C `%g` style float rendering shared by every execution tier.

/// Significant digits used by `%g` when no precision is given.
const PRECISION: i32 = 6;

/// Render `value` the way C's `printf("%g", value)` does.
///
/// # Examples
///
/// ```
/// use core_types::format_g;
///
/// assert_eq!(format_g(0.1), "0.1");
/// assert_eq!(format_g(100000.0), "100000");
/// assert_eq!(format_g(1234567.0), "1.23457e+06");
/// assert_eq!(format_g(0.00001), "1e-05");
/// ```
pub fn format_g(value: f64) -> String {
    if value.is_nan() {
        return if value.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // The exponent after rounding to PRECISION significant digits decides
    // between fixed and scientific notation.
    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            strip_trailing_zeros(mantissa),
            sign,
            exponent.abs()
        )
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn strip_trailing_zeros(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}
