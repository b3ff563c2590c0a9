use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const LOWER_BOUND_MARKERS: [&str; 7] =
    ["above", "over", "more than", "at least", "minimum", "starting", "+"];

/// Budget bounds captured for the PriceRange preference.
///
/// A lone amount is read as an upper bound ("my budget is 50000").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
}

impl PriceRange {
    pub fn between(min: Decimal, max: Decimal) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self { currency: None, min: Some(min), max: Some(max) }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        let currency = detect_currency(&normalized);
        let amounts = extract_amounts(&normalized);
        let (min, max) = match amounts.as_slice() {
            [] => return None,
            [single] => {
                if LOWER_BOUND_MARKERS.iter().any(|marker| normalized.contains(marker)) {
                    (Some(*single), None)
                } else {
                    (None, Some(*single))
                }
            }
            [first, second, ..] => {
                if first <= second {
                    (Some(*first), Some(*second))
                } else {
                    (Some(*second), Some(*first))
                }
            }
        };

        Some(Self { currency, min, max })
    }

    /// Whether `price` falls inside the range widened by `tolerance_pct` percent on each bound.
    ///
    /// A bound that overflows once widened no longer constrains the price.
    pub fn contains(&self, price: Decimal, tolerance_pct: Decimal) -> bool {
        let slack = |bound: Decimal| {
            bound.checked_mul(tolerance_pct).map(|widened| widened / Decimal::ONE_HUNDRED)
        };

        if let Some(min) = self.min.and_then(|min| min.checked_sub(slack(min)?)) {
            if price < min {
                return false;
            }
        }
        if let Some(max) = self.max.and_then(|max| max.checked_add(slack(max)?)) {
            if price > max {
                return false;
            }
        }
        true
    }

    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(match min.checked_add(max) {
                Some(sum) => sum / Decimal::TWO,
                None => min / Decimal::TWO + max / Decimal::TWO,
            }),
            (None, Some(max)) => Some(max),
            (Some(min), None) => Some(min),
            (None, None) => None,
        }
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(currency) = &self.currency {
            write!(f, "{currency} ")?;
        }
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "{}-{}", min.normalize(), max.normalize()),
            (None, Some(max)) => write!(f, "under {}", max.normalize()),
            (Some(min), None) => write!(f, "above {}", min.normalize()),
            (None, None) => write!(f, "any price"),
        }
    }
}

/// First monetary amount found in a listing's price text.
pub fn parse_price(text: &str) -> Option<Decimal> {
    extract_amounts(&text.to_lowercase()).into_iter().next()
}

fn detect_currency(text: &str) -> Option<String> {
    let code = if text.contains('₹')
        || has_word(text, "rs")
        || has_word(text, "inr")
        || text.contains("rupee")
    {
        "INR"
    } else if text.contains('$') || has_word(text, "usd") || text.contains("dollar") {
        "USD"
    } else if text.contains('€') || has_word(text, "eur") || text.contains("euro") {
        "EUR"
    } else if text.contains('£') || has_word(text, "gbp") || text.contains("pound") {
        "GBP"
    } else {
        return None;
    };
    Some(code.to_string())
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|character: char| !character.is_ascii_alphabetic()).any(|token| token == word)
}

/// Amounts in reading order with "k"/"lakh" applied.
///
/// In a short range such as "50-70k" the suffix on the second amount carries over to a
/// smaller bare first amount. Amounts that overflow once scaled are dropped.
fn extract_amounts(text: &str) -> Vec<Decimal> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut amounts: Vec<(Decimal, Option<Decimal>)> = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        if !chars[index].is_ascii_digit() {
            index += 1;
            continue;
        }

        let start = index;
        while index < chars.len()
            && (chars[index].is_ascii_digit() || chars[index] == ',' || chars[index] == '.')
        {
            index += 1;
        }

        let raw = chars[start..index].iter().filter(|character| **character != ',').collect::<String>();
        let Ok(amount) = Decimal::from_str(raw.trim_end_matches('.')) else {
            continue;
        };

        let rest = chars[index..].iter().collect::<String>();
        let rest = rest.trim_start();
        let multiplier = if rest.starts_with("lakh") || rest.starts_with("lac") {
            Some(Decimal::from(100_000))
        } else if rest.starts_with('k') {
            Some(Decimal::from(1_000))
        } else {
            None
        };
        amounts.push((amount, multiplier));
    }

    let carried = match amounts.as_slice() {
        [(first, None), (second, Some(multiplier))] if first <= second => Some(*multiplier),
        _ => None,
    };
    if let Some(multiplier) = carried {
        amounts[0].1 = Some(multiplier);
    }

    amounts
        .into_iter()
        .filter_map(|(amount, multiplier)| match multiplier {
            Some(multiplier) => amount.checked_mul(multiplier),
            None => Some(amount),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{parse_price, PriceRange};

    #[test]
    fn parses_plain_and_decorated_ranges() {
        let plain = PriceRange::parse("40000-60000").expect("range");
        assert_eq!(plain.min, Some(Decimal::from(40_000)));
        assert_eq!(plain.max, Some(Decimal::from(60_000)));
        assert_eq!(plain.currency, None);

        let decorated = PriceRange::parse("Rs 40,000 – Rs 45,000").expect("range");
        assert_eq!(decorated.min, Some(Decimal::from(40_000)));
        assert_eq!(decorated.max, Some(Decimal::from(45_000)));
        assert_eq!(decorated.currency.as_deref(), Some("INR"));
        assert_eq!(decorated.to_string(), "INR 40000-45000");

        let thousands = PriceRange::parse("50-70k").expect("short range");
        assert_eq!(thousands.min, Some(Decimal::from(50_000)));
        assert_eq!(thousands.max, Some(Decimal::from(70_000)));

        let lakhs = PriceRange::parse("1-1.5 lakh").expect("short range");
        assert_eq!(lakhs.min, Some(Decimal::from(100_000)));
        assert_eq!(lakhs.max, Some(Decimal::from(150_000)));

        let mixed = PriceRange::parse("800 to 1.2k").expect("mixed range");
        assert_eq!(mixed.min, Some(Decimal::from(800)));
        assert_eq!(mixed.max, Some(Decimal::from(1_200)));
    }

    #[test]
    fn single_amounts_become_bounds() {
        let under = PriceRange::parse("under $1.2k").expect("upper bound");
        assert_eq!(under.min, None);
        assert_eq!(under.max, Some(Decimal::from(1_200)));
        assert_eq!(under.to_string(), "USD under 1200");

        let above = PriceRange::parse("above 50000").expect("lower bound");
        assert_eq!(above.min, Some(Decimal::from(50_000)));
        assert_eq!(above.max, None);

        let lakh = PriceRange::parse("1.5 lakh").expect("lakh");
        assert_eq!(lakh.max, Some(Decimal::from(150_000)));
    }

    #[test]
    fn oversized_amounts_are_dropped_instead_of_overflowing() {
        assert!(PriceRange::parse("7922816251426433759354395033 lakh").is_none());
        assert_eq!(parse_price("79228162514264337593543950335k"), None);

        let partial = PriceRange::parse("7922816251426433759354395033k or 40000").expect("range");
        assert_eq!(partial.min, None);
        assert_eq!(partial.max, Some(Decimal::from(40_000)));

        let huge = PriceRange::between(Decimal::ONE, Decimal::MAX);
        assert!(huge.contains(Decimal::from(70_000), Decimal::from(50)));
        assert_eq!(huge.midpoint(), Some(Decimal::ONE / Decimal::TWO + Decimal::MAX / Decimal::TWO));
    }

    #[test]
    fn reversed_bounds_are_ordered() {
        let range = PriceRange::parse("between 70000 and 50000").expect("range");
        assert_eq!(range.min, Some(Decimal::from(50_000)));
        assert_eq!(range.max, Some(Decimal::from(70_000)));
    }

    #[test]
    fn text_without_amounts_is_not_a_range() {
        assert!(PriceRange::parse("something affordable").is_none());
        assert!(PriceRange::parse("   ").is_none());
    }

    #[test]
    fn containment_honours_tolerance() {
        let range = PriceRange::between(Decimal::from(40_000), Decimal::from(60_000));

        assert!(range.contains(Decimal::from(60_000), Decimal::ZERO));
        assert!(!range.contains(Decimal::from(60_001), Decimal::ZERO));
        assert!(range.contains(Decimal::from(62_000), Decimal::from(5)));
        assert!(!range.contains(Decimal::from(37_000), Decimal::from(5)));
    }

    #[test]
    fn listing_prices_take_the_first_amount() {
        assert_eq!(parse_price("Rs 54,990 (was 64,990)"), Some(Decimal::from(54_990)));
        assert_eq!(parse_price("$1,199.99"), Some(Decimal::new(119_999, 2)));
        assert_eq!(parse_price("price on request"), None);
    }
}
