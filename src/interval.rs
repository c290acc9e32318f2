use serde::{Deserialize, Serialize};

const MS_IN_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Calendar unit of a data interval, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    ThirdOfMonth,
    Month,
    Quarter,
    Semester,
    Year,
}

impl IntervalUnit {
    /// Milliseconds covered by `count` of this unit, on a 365.25-day year.
    pub fn range_ms(self, count: f64) -> f64 {
        let base = match self {
            IntervalUnit::Year => MS_IN_DAY * 365.25,
            IntervalUnit::Semester => MS_IN_DAY * 365.25 / 2.0,
            IntervalUnit::Quarter => MS_IN_DAY * 365.25 / 4.0,
            IntervalUnit::Month => MS_IN_DAY * 365.25 / 12.0,
            IntervalUnit::ThirdOfMonth => MS_IN_DAY * 365.25 / 36.0,
            IntervalUnit::Week => MS_IN_DAY * 7.0,
            IntervalUnit::Day => MS_IN_DAY,
            IntervalUnit::Hour => 60.0 * 60.0 * 1000.0,
            IntervalUnit::Minute => 60.0 * 1000.0,
            IntervalUnit::Second => 1000.0,
            IntervalUnit::Millisecond => 1.0,
        };
        base * count
    }
}

/// Calendar interval guessed from a millisecond gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntervalEstimate {
    pub unit: IntervalUnit,
    /// Unit multiplier; fractional only for the coarse large-range fallback.
    pub count: f64,
}

struct Estimation {
    unit: IntervalUnit,
    range: f64,
    /// Units a data vendor realistically emits rows at; composite units
    /// (week, quarter...) never win the large-range fallback.
    basic: bool,
}

/// Largest unit first; estimation uses a 365-day year and a 28-day month so
/// that slightly short calendar intervals still snap to the larger unit.
const ESTIMATIONS: [Estimation; 11] = [
    Estimation { unit: IntervalUnit::Year, range: MS_IN_DAY * 365.0, basic: true },
    Estimation { unit: IntervalUnit::Semester, range: MS_IN_DAY * 365.0 / 2.0, basic: false },
    Estimation { unit: IntervalUnit::Quarter, range: MS_IN_DAY * 365.0 / 4.0, basic: false },
    Estimation { unit: IntervalUnit::Month, range: MS_IN_DAY * 28.0, basic: true },
    Estimation { unit: IntervalUnit::ThirdOfMonth, range: MS_IN_DAY * 365.0 / 36.0, basic: false },
    Estimation { unit: IntervalUnit::Week, range: MS_IN_DAY * 7.0, basic: false },
    Estimation { unit: IntervalUnit::Day, range: MS_IN_DAY, basic: true },
    Estimation { unit: IntervalUnit::Hour, range: 60.0 * 60.0 * 1000.0, basic: true },
    Estimation { unit: IntervalUnit::Minute, range: 60.0 * 1000.0, basic: true },
    Estimation { unit: IntervalUnit::Second, range: 1000.0, basic: true },
    Estimation { unit: IntervalUnit::Millisecond, range: 1.0, basic: true },
];

/// Guesses the calendar interval that produced a gap of `range` milliseconds.
///
/// Scans units largest first, keeping the first unit that fits at least once
/// (with 10% tolerance) and whose multiplier is nearly integral. When the
/// winning multiplier exceeds 100 and a larger basic unit also fit, the
/// estimate falls back to that larger unit with a multiplier rounded to
/// twentieths. Non-positive and NaN ranges estimate as one millisecond.
pub fn estimate_interval(range: f64) -> IntervalEstimate {
    let interval = range.floor();
    let mut count = 1.0;
    let mut chosen: Option<&Estimation> = None;
    let mut largest: Option<&Estimation> = None;
    if interval > 0.0 {
        for est in ESTIMATIONS.iter() {
            let div = interval / est.range;
            if (div * 1.1).floor() >= 1.0 {
                if largest.is_none() {
                    largest = Some(est);
                }
                chosen = Some(est);
                if div - div.floor() < 0.15 {
                    count = div.floor();
                    break;
                }
            }
        }
        if let (Some(lg), Some(ch)) = (largest, chosen) {
            if lg.unit != ch.unit && lg.basic && count > 100.0 {
                chosen = Some(lg);
                count = (20.0 * interval / lg.range).round() / 20.0;
            }
        }
    }
    IntervalEstimate {
        unit: chosen.map_or(IntervalUnit::Millisecond, |e| e.unit),
        count,
    }
}
