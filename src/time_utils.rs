use chrono::{DateTime, Datelike, TimeZone, Utc};

/// A calendar month identified by year and month number (1-12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "invalid month: {}", month);
        Self { year, month }
    }

    pub fn of(when: &DateTime<Utc>) -> Self {
        Self::new(when.year(), when.month())
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    /// Instant halfway through the month.
    pub fn midpoint(self) -> DateTime<Utc> {
        let start = Utc
            .with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .expect("valid month start");
        let half_seconds = i64::from(days_in_month(self.year, self.month)) * 86_400 / 2;
        start + chrono::Duration::seconds(half_seconds)
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// The two months whose midpoints bracket `when`, with the fractional
/// distance of `when` between those midpoints.
///
/// A timestamp before its own month's midpoint brackets with the previous
/// month; at or after, with the next. The fraction is 0 at the first
/// midpoint and 1 at the second.
pub fn bracketing_months(when: &DateTime<Utc>) -> (YearMonth, YearMonth, f64) {
    let this = YearMonth::of(when);
    let (m0, m1) = if *when < this.midpoint() {
        (this.prev(), this)
    } else {
        (this, this.next())
    };

    let t0 = m0.midpoint();
    let t1 = m1.midpoint();
    let span = (t1 - t0).num_seconds() as f64;
    let frac = (*when - t0).num_seconds() as f64 / span;
    (m0, m1, frac)
}

/// Calculate the number of days in a given month
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => panic!("Invalid month: {}", month),
    }
}

/// Check if a year is a leap year
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
