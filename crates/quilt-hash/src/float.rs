//! Python-`repr` compatible float formatting.
//!
//! Rust's `{:e}` formatter already yields the shortest digit string that
//! round-trips; this module only rearranges those digits into the layout
//! Python's `json` module emits.

/// Exponents below this (as a decimal-point position) switch to scientific form.
const SCI_SMALL: i32 = -4;
/// Decimal-point positions above this switch to scientific form.
const SCI_LARGE: i32 = 16;

/// Format a finite `f64` exactly as Python's `repr(float)` does.
///
/// ```
/// use quilt_hash::format_float;
/// assert_eq!(format_float(1.0), "1.0");
/// assert_eq!(format_float(0.00001), "1e-05");
/// assert_eq!(format_float(1e20), "1e+20");
/// assert_eq!(format_float(-0.0001), "-0.0001");
/// ```
pub fn format_float(value: f64) -> String {
    let mut out = String::new();
    if value.is_sign_negative() {
        out.push('-');
    }

    let (digits, exponent) = shortest_digits(value.abs());
    // Position of the decimal point relative to the start of `digits`.
    let decpt = exponent + 1;

    if decpt <= SCI_SMALL || decpt > SCI_LARGE {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let exp = decpt - 1;
        out.push('e');
        out.push(if exp < 0 { '-' } else { '+' });
        out.push_str(&format!("{:02}", exp.abs()));
    } else if decpt <= 0 {
        out.push_str("0.");
        out.push_str(&"0".repeat(decpt.unsigned_abs() as usize));
        out.push_str(&digits);
    } else {
        let point = decpt as usize;
        if point >= digits.len() {
            out.push_str(&digits);
            out.push_str(&"0".repeat(point - digits.len()));
            out.push_str(".0");
        } else {
            out.push_str(&digits[..point]);
            out.push('.');
            out.push_str(&digits[point..]);
        }
    }
    out
}

/// Shortest round-tripping significand digits of `value` and its decimal
/// exponent, as in `d.ddd * 10^exponent`.
fn shortest_digits(value: f64) -> (String, i32) {
    let sci = format!("{value:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let parsed = exponent.parse::<i32>();
    debug_assert!(parsed.is_ok(), "unexpected exponent in {sci:?}");
    let digits = mantissa.chars().filter(|c| *c != '.').collect();
    (digits, parsed.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reference_strings() {
        let cases = [
            (1.0, "1.0"),
            (0.00001, "1e-05"),
            (1e20, "1e+20"),
            (-0.0001, "-0.0001"),
            (0.0001, "0.0001"),
            (1e16, "1e+16"),
            (1.5e-7, "1.5e-07"),
            (2.5e-5, "2.5e-05"),
            (0.1, "0.1"),
            (12345.678, "12345.678"),
            (123456789.123, "123456789.123"),
            (9999999999999998.0, "9999999999999998.0"),
            (0.0, "0.0"),
            (-0.0, "-0.0"),
            (5e-324, "5e-324"),
            (1.7976931348623157e308, "1.7976931348623157e+308"),
        ];
        for (value, expected) in cases {
            assert_eq!(format_float(value), expected, "formatting {value:?}");
        }
    }

    #[test]
    fn digits_and_exponent_are_split() {
        assert_eq!(shortest_digits(1.5e-7), ("15".to_owned(), -7));
        assert_eq!(shortest_digits(12345.678), ("12345678".to_owned(), 4));
        assert_eq!(shortest_digits(0.0), ("0".to_owned(), 0));
    }

    #[test]
    fn integral_values_keep_trailing_zero() {
        assert_eq!(format_float(100.0), "100.0");
        assert_eq!(format_float(-42.0), "-42.0");
    }

    proptest! {
        #[test]
        fn output_parses_back_to_same_value(v in proptest::num::f64::NORMAL | proptest::num::f64::SUBNORMAL | proptest::num::f64::ZERO) {
            let s = format_float(v);
            let parsed: f64 = s.parse().unwrap();
            prop_assert_eq!(parsed.to_bits(), v.to_bits());
        }

        #[test]
        fn fixed_form_always_has_a_point(v in 1e-4f64..1e16) {
            let s = format_float(v);
            prop_assert!(s.contains('.'));
            prop_assert!(!s.contains('e'));
        }
    }
}
