//! Exact comparison of number values.
//!
//! Numbers travel as decimal strings and may carry more precision than an
//! `f64` holds, so they are compared digit by digit. A parsed number is kept
//! as `0.<digits> x 10^exponent` with no leading or trailing zeros in
//! `digits`; zero has no digits.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Decimal {
    negative: bool,
    digits: String,
    exponent: i64,
}

impl Decimal {
    fn parse(s: &str) -> Option<Self> {
        let (negative, rest) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };
        let (mantissa, exp) = match rest.find(['e', 'E']) {
            Some(pos) => (&rest[..pos], rest[pos + 1..].parse::<i64>().ok()?),
            None => (rest, 0),
        };
        let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int.is_empty() && frac.is_empty() {
            return None;
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let all = format!("{int}{frac}");
        let significant = all.trim_start_matches('0');
        let leading_zeros = i64::try_from(all.len() - significant.len()).ok()?;
        let digits = significant.trim_end_matches('0').to_owned();
        if digits.is_empty() {
            return Some(Self {
                negative: false,
                digits,
                exponent: 0,
            });
        }
        let point = i64::try_from(int.len()).ok()?.checked_add(exp)?;
        Some(Self {
            negative,
            digits,
            exponent: point - leading_zeros,
        })
    }

    fn signum(&self) -> i8 {
        match (self.digits.is_empty(), self.negative) {
            (true, _) => 0,
            (false, true) => -1,
            (false, false) => 1,
        }
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.exponent
            .cmp(&other.exponent)
            .then_with(|| self.digits.as_bytes().cmp(other.digits.as_bytes()))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.signum().cmp(&other.signum()) {
            Ordering::Equal if self.negative => other.cmp_magnitude(self),
            Ordering::Equal => self.cmp_magnitude(other),
            unequal => unequal,
        }
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Numeric comparison of decimal strings. `None` if either is not a number.
#[must_use]
pub fn compare_numbers(a: &str, b: &str) -> Option<Ordering> {
    Some(Decimal::parse(a)?.cmp(&Decimal::parse(b)?))
}

/// One spelling per numeric value, so equal numbers hash alike.
/// Strings that are not numbers come back unchanged.
#[must_use]
pub fn canonical_number(s: &str) -> String {
    match Decimal::parse(s) {
        None => s.to_owned(),
        Some(d) if d.digits.is_empty() => "0".to_owned(),
        Some(d) => {
            let sign = if d.negative { "-" } else { "" };
            format!("{sign}0.{}e{}", d.digits, d.exponent)
        }
    }
}
