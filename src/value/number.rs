//! Number <-> text conversions used by value coercion.

/// Significant digits kept when rendering a number as text.
const PRECISION: usize = 15;

/// Renders a number the way scripts observe it through `String(n)`.
///
/// Up to 15 significant digits with trailing zeros removed. Magnitudes in
/// `[1e-5, 1e15)` print in decimal form; anything else switches to
/// exponential notation with an unpadded, explicitly signed exponent.
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-Infinity" } else { "Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    // Rounds to PRECISION significant digits; the exponent reflects the
    // rounded value (9.99999999999999999e-5 becomes 1e-4).
    let scientific = format!("{:.*e}", PRECISION - 1, value.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let digits = match digits.trim_end_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };

    let body = if (-5..PRECISION as i32).contains(&exponent) {
        decimal_form(digits, exponent)
    } else {
        exponential_form(digits, exponent)
    };

    if value.is_sign_negative() {
        format!("-{body}")
    } else {
        body
    }
}

fn decimal_form(digits: &str, exponent: i32) -> String {
    if exponent < 0 {
        let zeros = "0".repeat((-exponent - 1) as usize);
        return format!("0.{zeros}{digits}");
    }
    let integer_len = exponent as usize + 1;
    if digits.len() > integer_len {
        format!("{}.{}", &digits[..integer_len], &digits[integer_len..])
    } else {
        format!("{digits}{}", "0".repeat(integer_len - digits.len()))
    }
}

fn exponential_form(digits: &str, exponent: i32) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    let (lead, rest) = digits.split_at(1);
    if rest.is_empty() {
        format!("{lead}e{sign}{}", exponent.abs())
    } else {
        format!("{lead}.{rest}e{sign}{}", exponent.abs())
    }
}

/// Parses script text as a floating literal.
///
/// Leading ASCII whitespace is skipped; anything left unconsumed, an empty
/// literal, or a literal that overflows to infinity (including the words
/// `Infinity`/`-Infinity`) yields NaN. Hexadecimal integers (`0x1F`) are
/// accepted.
pub fn parse_number(text: &str) -> f64 {
    let literal = text.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if let Some(value) = parse_hex(literal) {
        return value;
    }
    match literal.parse::<f64>() {
        Ok(value) if value.is_infinite() => f64::NAN,
        Ok(value) => value,
        Err(_) => f64::NAN,
    }
}

fn parse_hex(literal: &str) -> Option<f64> {
    let (negative, unsigned) = match literal.as_bytes().first() {
        Some(b'-') => (true, &literal[1..]),
        Some(b'+') => (false, &literal[1..]),
        _ => (false, literal),
    };
    let hex = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))?;
    if !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    let magnitude = u64::from_str_radix(hex, 16).ok()? as f64;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_special_values() {
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(0.0), "0");
        assert_eq!(number_to_string(-0.0), "0");
    }

    #[test]
    fn formats_decimal_range() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(100.0), "100");
        assert_eq!(number_to_string(-42.5), "-42.5");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(123.456), "123.456");
        assert_eq!(number_to_string(999999999999999.0), "999999999999999");
        assert_eq!(number_to_string(1.0 / 3.0), "0.333333333333333");
    }

    #[test]
    fn small_magnitudes_stay_decimal_down_to_1e5() {
        assert_eq!(number_to_string(0.00001234), "0.00001234");
        assert_eq!(number_to_string(0.00001), "0.00001");
        assert_eq!(number_to_string(0.0001), "0.0001");
    }

    #[test]
    fn switches_to_exponential_outside_range() {
        assert_eq!(number_to_string(1e15), "1e+15");
        assert_eq!(number_to_string(1e16), "1e+16");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(-2.5e20), "-2.5e+20");
        assert_eq!(number_to_string(1.23456789012346e-6), "1.23456789012346e-6");
        assert_eq!(number_to_string(1e100), "1e+100");
    }

    #[test]
    fn parses_literals_strictly() {
        assert_eq!(parse_number("42"), 42.0);
        assert_eq!(parse_number("  -3.5"), -3.5);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert_eq!(parse_number("0x1F"), 31.0);
        assert!(parse_number("0x+1F").is_nan());
        assert!(parse_number("0x-1F").is_nan());
        assert!(parse_number("0x").is_nan());
        assert!(parse_number("").is_nan());
        assert!(parse_number("12abc").is_nan());
        assert!(parse_number("3 ").is_nan());
        assert!(parse_number("Infinity").is_nan());
        assert!(parse_number("-Infinity").is_nan());
        assert!(parse_number("1e400").is_nan());
    }
}
