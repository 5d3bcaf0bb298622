// Keyhost Engine — Best-Quote Selection
//
// Ranking rule:
//   1. Higher parsed `amount_out` wins.
//   2. Amounts within 0.1% of each other (relative to the larger) are a tie,
//      broken by provider priority, higher first.
//   3. An amount that does not parse as a number goes straight to the
//      priority comparison.
//
// The tie band makes the rule non-transitive, so the fold runs over a fixed
// order (priority desc, then name asc) to keep the winner independent of
// the order in which provider responses arrived.

use crate::atoms::constants::QUOTE_TIE_THRESHOLD;
use crate::atoms::types::SwapQuote;
use std::cmp::Ordering;

/// A successful quote plus the registry data needed to rank it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: String,
    pub priority: i32,
    pub quote: SwapQuote,
}

fn parse_amount(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// `Greater` when `a` ranks above `b`.
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    let by_priority = a.priority.cmp(&b.priority);

    let (Some(x), Some(y)) = (parse_amount(&a.quote.amount_out), parse_amount(&b.quote.amount_out)) else {
        return by_priority;
    };

    let larger = x.max(y);
    if larger == 0.0 || (x - y).abs() / larger < QUOTE_TIE_THRESHOLD {
        return by_priority;
    }
    x.partial_cmp(&y).unwrap_or(by_priority)
}

/// Pick the winning candidate. `None` only for an empty slice.
pub fn select_best(mut candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.provider.cmp(&b.provider)));

    let mut iter = candidates.into_iter();
    let mut best = iter.next()?;
    for c in iter {
        if compare(&c, &best) == Ordering::Greater {
            best = c;
        }
    }
    best.quote.provider = best.provider.clone();
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cand(provider: &str, priority: i32, out: &str) -> Candidate {
        Candidate {
            provider: provider.into(),
            priority,
            quote: SwapQuote {
                amount_in: "1".into(),
                amount_out: out.into(),
                price_impact: 0.1,
                provider: String::new(),
                route: vec![],
                valid_until: Utc::now() + chrono::Duration::seconds(30),
            },
        }
    }

    #[test]
    fn test_max_output_wins() {
        let best = select_best(vec![cand("a", 10, "100"), cand("b", 1, "120"), cand("c", 5, "90")]).unwrap();
        assert_eq!(best.provider, "b");
        assert_eq!(best.quote.provider, "b");
    }

    #[test]
    fn test_order_independent() {
        let sets = [
            vec![cand("a", 1, "100"), cand("b", 2, "150"), cand("c", 3, "149.99")],
            vec![cand("c", 3, "149.99"), cand("a", 1, "100"), cand("b", 2, "150")],
            vec![cand("b", 2, "150"), cand("c", 3, "149.99"), cand("a", 1, "100")],
        ];
        let winners: Vec<String> = sets.into_iter().map(|s| select_best(s).unwrap().provider).collect();
        assert!(winners.iter().all(|w| w == &winners[0]));
    }

    #[test]
    fn test_near_tie_prefers_priority() {
        // 0.05% apart: within the tie band.
        let best = select_best(vec![cand("cheap", 1, "1000.5"), cand("trusted", 9, "1000")]).unwrap();
        assert_eq!(best.provider, "trusted");
    }

    #[test]
    fn test_outside_tie_band_amount_wins() {
        // 0.5% apart.
        let best = select_best(vec![cand("better", 1, "1005"), cand("trusted", 9, "1000")]).unwrap();
        assert_eq!(best.provider, "better");
    }

    #[test]
    fn test_unparsable_amount_falls_back_to_priority() {
        assert_eq!(compare(&cand("x", 5, "n/a"), &cand("y", 1, "999999")), Ordering::Greater);
        let best = select_best(vec![cand("x", 1, "garbage"), cand("y", 2, "10")]).unwrap();
        assert_eq!(best.provider, "y");
    }

    #[test]
    fn test_empty() {
        assert!(select_best(vec![]).is_none());
    }
}
