use crate::core::{field_type::TextNumberFormat, filter::NumericRange};

// Rounding applied to enumerated values so that 0.1 steps render as "0.3", not "0.30000000000000004"
const CANDIDATE_PRECISION: f64 = 1e6;

/// Exact-match candidates covering a numeric range over a formatted text column.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidates {
    pub values: Vec<String>,
    /// The cap stopped the enumeration before the end of the range.
    pub truncated: bool,
}

// Past 2^53 consecutive grid indexes are no longer distinct floats
const MAX_GRID_INDEX: f64 = 9_007_199_254_740_992.0;

/// Enumerates every value on the format's step grid inside `range`, rendered the
/// way the column stores it. An open upper bound always ends at the cap.
///
/// Values stored off the grid (`"$10.5M"` with a step of 1) are never matched.
/// Returns `None` when a bound lies beyond the representable grid.
pub fn enumerate_candidates(format: &TextNumberFormat, range: &NumericRange, cap: usize) -> Option<Candidates> {
    let step = if format.step.is_finite() && format.step > 0.0 {
        format.step
    } else {
        1.0
    };

    let start = range.min.unwrap_or(0.0);
    let first = (start / step - 1e-9).ceil();

    if !on_grid(first) || range.max.is_some_and(|max| !on_grid(max / step)) {
        return None;
    }

    let mut values = Vec::with_capacity(cap.min(64));
    let mut index = first as i64;

    loop {
        let value = round_candidate(index as f64 * step);

        if let Some(max) = range.max {
            if value > max + 1e-9 {
                return Some(Candidates { values, truncated: false });
            }
        }

        if values.len() == cap {
            return Some(Candidates { values, truncated: true });
        }

        values.push(format.render(value));

        index = match index.checked_add(1) {
            Some(next) => next,
            None => return Some(Candidates { values, truncated: true }),
        };
    }
}

fn round_candidate(value: f64) -> f64 {
    if value.abs() < MAX_GRID_INDEX / CANDIDATE_PRECISION {
        (value * CANDIDATE_PRECISION).round() / CANDIDATE_PRECISION
    } else {
        value
    }
}

fn on_grid(index: f64) -> bool {
    index.is_finite() && index.abs() < MAX_GRID_INDEX
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank() -> TextNumberFormat {
        TextNumberFormat::new("# ", "", 1.0, false)
    }

    #[test]
    fn test_closed_range_enumerates_every_step() {
        let range = NumericRange::new(Some(3.0), Some(6.0)).unwrap();
        let candidates = enumerate_candidates(&rank(), &range, 50).unwrap();

        assert_eq!(candidates.values, vec!["# 3", "# 4", "# 5", "# 6"]);
        assert!(!candidates.truncated);
    }

    #[test]
    fn test_cap_truncates_and_reports_it() {
        let range = NumericRange::new(Some(1.0), Some(1000.0)).unwrap();
        let candidates = enumerate_candidates(&rank(), &range, 50).unwrap();

        assert_eq!(candidates.values.len(), 50);
        assert_eq!(candidates.values.last().map(String::as_str), Some("# 50"));
        assert!(candidates.truncated);
    }

    #[test]
    fn test_exactly_cap_sized_range_is_not_truncated() {
        let range = NumericRange::new(Some(1.0), Some(50.0)).unwrap();
        let candidates = enumerate_candidates(&rank(), &range, 50).unwrap();

        assert_eq!(candidates.values.len(), 50);
        assert!(!candidates.truncated);
    }

    #[test]
    fn test_open_range_always_truncated() {
        let range = NumericRange::new(Some(100.0), None).unwrap();
        let candidates = enumerate_candidates(&rank(), &range, 5).unwrap();

        assert_eq!(candidates.values, vec!["# 100", "# 101", "# 102", "# 103", "# 104"]);
        assert!(candidates.truncated);
    }

    #[test]
    fn test_fractional_steps_render_cleanly() {
        let money = TextNumberFormat::new("$", "B", 0.1, false);
        let range = NumericRange::new(Some(0.25), Some(0.6)).unwrap();
        let candidates = enumerate_candidates(&money, &range, 50).unwrap();

        assert_eq!(candidates.values, vec!["$0.3B", "$0.4B", "$0.5B", "$0.6B"]);
    }

    #[test]
    fn test_range_between_grid_points_is_empty() {
        let range = NumericRange::new(Some(10.2), Some(10.7)).unwrap();
        let candidates = enumerate_candidates(&rank(), &range, 50).unwrap();

        assert!(candidates.values.is_empty());
        assert!(!candidates.truncated);
    }

    #[test]
    fn test_bounds_beyond_the_grid_are_rejected() {
        let open = NumericRange::new(Some(1e19), None).unwrap();
        assert_eq!(enumerate_candidates(&rank(), &open, 3), None);

        let closed = NumericRange::new(Some(1e20), Some(2e20)).unwrap();
        assert_eq!(enumerate_candidates(&rank(), &closed, 3), None);

        let huge_max = NumericRange::new(Some(1.0), Some(1e300)).unwrap();
        assert_eq!(enumerate_candidates(&rank(), &huge_max, 3), None);
    }

    #[test]
    fn test_largest_grid_values_still_enumerate() {
        let range = NumericRange::new(Some(4e15), None).unwrap();
        let candidates = enumerate_candidates(&rank(), &range, 2).unwrap();

        assert_eq!(candidates.values, vec!["# 4000000000000000", "# 4000000000000001"]);
        assert!(candidates.truncated);
    }
}
