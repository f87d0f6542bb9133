//! Term-shape predicates and numeric formatting.

/// Number-formatting configuration, passed into the parser instead of
/// any process-wide locale state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    /// Decimal separator, `.` in the default configuration.
    pub decimal: char,
    /// Digit-grouping separator, `,` in the default configuration.
    pub group: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self { decimal: '.', group: ',' }
    }
}

/// Non-empty and entirely ASCII alphabetic.
pub fn is_alpha(term: &str) -> bool {
    !term.is_empty() && term.bytes().all(|b| b.is_ascii_alphabetic())
}

pub fn parse_number(term: &str, fmt: &NumberFormat) -> Option<f64> {
    if term.is_empty() {
        return None;
    }
    let canonical: String;
    let s = if fmt.decimal == '.' {
        term
    } else {
        canonical = term.replace(fmt.decimal, ".");
        &canonical
    };
    match s.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(n),
        _ => None,
    }
}

/// `a/b` with integer parts, non-zero denominator, optional leading
/// minus on the numerator.
pub fn is_fraction(term: &str) -> bool {
    let Some((num, den)) = term.split_once('/') else {
        return false;
    };
    let num_ok = num.strip_prefix('-').unwrap_or(num).parse::<u64>().is_ok()
        && num != "-";
    let den_ok = den.parse::<u64>().map(|d| d > 0).unwrap_or(false);
    num_ok && den_ok
}

/// Recognizes an integer written with digit grouping (`2,500`). The
/// stripped digits must parse and re-grouping them must reproduce the
/// input exactly, so `2,50` or `1,234.5` are rejected.
pub fn parse_grouped_number(term: &str, fmt: &NumberFormat) -> Option<i64> {
    let stripped: String = term.chars().filter(|&c| c != fmt.group).collect();
    let value = parse_number(&stripped, fmt)?;
    let int = value.trunc() as i64;
    if format_grouped(int, fmt) == term {
        Some(int)
    } else {
        None
    }
}

pub fn format_grouped(n: i64, fmt: &NumberFormat) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        grouped.push('-');
    }
    let lead = digits.len() % 3;
    let mut first = true;
    if lead > 0 {
        grouped.push_str(&digits[..lead]);
        first = false;
    }
    let mut i = lead;
    while i < digits.len() {
        if !first {
            grouped.push(fmt.group);
        }
        grouped.push_str(&digits[i..i + 3]);
        first = false;
        i += 3;
    }
    grouped
}

/// Renders a magnitude with a K/M/B suffix: values are rounded to two
/// decimals and scaled by the first threshold their absolute value
/// reaches (1e3, 1e6, 1e9).
pub fn format_magnitude(num: f64) -> String {
    let abs = num.abs();
    if abs < 1_000.0 {
        format_short(num)
    } else if abs < 1_000_000.0 {
        format!("{}K", format_short(num / 1_000.0))
    } else if abs < 1_000_000_000.0 {
        format!("{}M", format_short(num / 1_000_000.0))
    } else {
        format!("{}B", format_short(num / 1_000_000_000.0))
    }
}

/// Rounds to two decimals and prints without trailing zeros.
pub fn format_short(num: f64) -> String {
    let rounded = (num * 100.0).round() / 100.0;
    if rounded == rounded.trunc() && rounded.abs() < 1e15 {
        format!("{}", rounded.trunc() as i64)
    } else {
        format!("{rounded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_terms() {
        assert!(is_alpha("Apple"));
        assert!(!is_alpha("u.s."));
        assert!(!is_alpha("3rd"));
        assert!(!is_alpha(""));
    }

    #[test]
    fn numbers_parse() {
        let fmt = NumberFormat::default();
        assert_eq!(parse_number("2.5", &fmt), Some(2.5));
        assert_eq!(parse_number("0", &fmt), Some(0.0));
        assert_eq!(parse_number("1,000", &fmt), None);
        assert_eq!(parse_number("ten", &fmt), None);
    }

    #[test]
    fn alternate_decimal_separator() {
        let fmt = NumberFormat { decimal: ',', group: '.' };
        assert_eq!(parse_number("2,5", &fmt), Some(2.5));
        assert_eq!(parse_grouped_number("1.250", &fmt), Some(1250));
    }

    #[test]
    fn fractions() {
        assert!(is_fraction("3/4"));
        assert!(is_fraction("-1/2"));
        assert!(!is_fraction("3/0"));
        assert!(!is_fraction("3.5/4"));
        assert!(!is_fraction("22"));
    }

    #[test]
    fn grouped_numbers() {
        let fmt = NumberFormat::default();
        assert_eq!(parse_grouped_number("2,500", &fmt), Some(2500));
        assert_eq!(parse_grouped_number("1,234,567", &fmt), Some(1_234_567));
        assert_eq!(parse_grouped_number("2,50", &fmt), None);
        assert_eq!(parse_grouped_number("1,234.5", &fmt), None);
        assert_eq!(parse_grouped_number("1234", &fmt), None);
    }

    #[test]
    fn magnitude_suffixes() {
        assert_eq!(format_magnitude(35.0), "35");
        assert_eq!(format_magnitude(2.512), "2.51");
        assert_eq!(format_magnitude(1_500.0), "1.5K");
        assert_eq!(format_magnitude(2_500_000.0), "2.5M");
        assert_eq!(format_magnitude(3_000_000_000.0), "3B");
        assert_eq!(format_magnitude(-12_000.0), "-12K");
    }
}
