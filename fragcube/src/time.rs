use log::warn;

use crate::errors::Result;

/// Resolves time-window expressions against a time coordinate's metadata.
///
/// Calendar arithmetic lives outside this crate. The import pipeline hands the
/// parser the filter text plus the dimension's `units` and `calendar`
/// attributes and gets back bounds expressed in the dimension's own units.
///
pub trait TimeParser: Send + Sync {
    fn coordinate_bounds(&self, filter: &str, units: &str, calendar: &str) -> Result<(f64, f64)>;
}

/// Normalize a time value for cross-file comparison.
///
/// The units string is matched by its first character against the known
/// granularities, day down to second, and the value is divided through every
/// stage at or below the match: by 4 (day to 6h), 2 (6h to 3h), 3 (3h to
/// hour), 60 (hour to minute) and 60 (minute to second). An unrecognized
/// prefix leaves the value unchanged with a warning. Values normalized with
/// the same units stay ordered, which is all the merge needs.
///
pub fn to_common_unit(value: f64, units: &str) -> f64 {
    let stage = match units.chars().next() {
        Some('d') => 0,
        Some('6') => 1,
        Some('3') => 2,
        Some('h') => 3,
        Some('m') => 4,
        Some('s') => 5,
        _ => {
            warn!("unrecognized time units {:?}, using value as is", units);
            return value;
        }
    };

    let mut value = value;
    if stage <= 0 {
        value /= 4.0;
    }
    if stage <= 1 {
        value /= 2.0;
    }
    if stage <= 2 {
        value /= 3.0;
    }
    if stage <= 3 {
        value /= 60.0;
    }
    if stage <= 4 {
        value /= 60.0;
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_pass_through() {
        assert_eq!(to_common_unit(120.0, "seconds"), 120.0);
    }

    #[test]
    fn test_division_chain() {
        assert_eq!(to_common_unit(120.0, "minutes"), 2.0);
        assert_eq!(to_common_unit(7200.0, "hours"), 2.0);
        assert_eq!(to_common_unit(21600.0, "3h periods"), 2.0);
        assert_eq!(to_common_unit(43200.0, "6h periods"), 2.0);
        assert_eq!(to_common_unit(86400.0, "days since 1990-01-01"), 1.0);
    }

    #[test]
    fn test_unknown_units_unchanged() {
        assert_eq!(to_common_unit(42.0, "fortnights"), 42.0);
        assert_eq!(to_common_unit(42.0, ""), 42.0);
    }

    #[test]
    fn test_ordering_preserved_within_units() {
        let a = to_common_unit(10.0, "days since 2000-01-01");
        let b = to_common_unit(20.0, "days since 2000-01-01");
        assert!(a < b);
    }
}
