use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::{CronError, Result};

/// How far `next_after` scans before declaring a schedule unsatisfiable.
/// Four years covers every leap-day expression; anything still unmatched
/// (e.g. `0 0 31 2 *`) can never fire.
const SCAN_HORIZON_DAYS: i64 = 4 * 366;

/// A parsed, validated five-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

/// One field, normalised to the set of values it allows.
///
/// `unrestricted` records whether the field was written as a bare `*`,
/// which the day-of-month/day-of-week combination rule needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    unrestricted: bool,
    allowed: Vec<u32>,
}

impl Field {
    fn contains(&self, value: u32) -> bool {
        self.allowed.binary_search(&value).is_ok()
    }
}

impl CronExpr {
    /// Parse an expression. Exactly five whitespace-separated fields;
    /// anything else is an error, never silently ignored.
    pub fn parse(expr: &str) -> Result<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CronError::FieldCount { found: parts.len() });
        }

        Ok(Self {
            minute: parse_field("minute", parts[0], 0, 59)?,
            hour: parse_field("hour", parts[1], 0, 23)?,
            day_of_month: parse_field("day-of-month", parts[2], 1, 31)?,
            month: parse_field("month", parts[3], 1, 12)?,
            day_of_week: parse_weekday_field(parts[4])?,
        })
    }

    /// Does the expression match the given instant (at minute resolution)?
    pub fn matches(&self, time: &DateTime<Utc>) -> bool {
        self.minute.contains(time.minute())
            && self.hour.contains(time.hour())
            && self.month.contains(time.month())
            && self.day_matches(time.date_naive())
    }

    /// The standard cron combination rule: when both day-of-month and
    /// day-of-week are restricted, a day satisfying either fires; when one
    /// is `*`, the other alone decides.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.day_of_month.contains(date.day());
        let dow = self
            .day_of_week
            .contains(date.weekday().num_days_from_sunday());

        match (self.day_of_month.unrestricted, self.day_of_week.unrestricted) {
            (false, false) => dom || dow,
            (false, true) => dom,
            (true, false) => dow,
            (true, true) => true,
        }
    }

    /// Earliest minute-aligned instant strictly after `after` that matches.
    ///
    /// Returns `None` when no instant within the scan horizon matches,
    /// i.e. the expression describes an impossible date.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Truncate to the minute, then step one minute forward so the
        // result is strictly greater than the reference.
        let mut t = Utc
            .with_ymd_and_hms(
                after.year(),
                after.month(),
                after.day(),
                after.hour(),
                after.minute(),
                0,
            )
            .single()?
            + Duration::minutes(1);
        let horizon = *after + Duration::days(SCAN_HORIZON_DAYS);

        while t < horizon {
            if !self.month.contains(t.month()) {
                t = start_of_next_month(&t)?;
                continue;
            }
            if !self.day_matches(t.date_naive()) {
                // Jump to midnight of the next day.
                t = Utc
                    .with_ymd_and_hms(t.year(), t.month(), t.day(), 0, 0, 0)
                    .single()?
                    + Duration::days(1);
                continue;
            }
            if !self.hour.contains(t.hour()) {
                t = Utc
                    .with_ymd_and_hms(t.year(), t.month(), t.day(), t.hour(), 0, 0)
                    .single()?
                    + Duration::hours(1);
                continue;
            }
            if !self.minute.contains(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    /// Due-ness test: given the last execution (or creation) instant, is the
    /// job's next trigger at or before `now`?
    pub fn is_due(&self, reference: &DateTime<Utc>, now: &DateTime<Utc>) -> bool {
        self.next_after(reference).is_some_and(|next| next <= *now)
    }
}

/// First minute of the month after `t`.
fn start_of_next_month(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// Parse one field into its normalised allowed-value set.
///
/// Grammar per comma-separated element: `*`, `*/n`, `a`, `a-b`, `a-b/n`.
fn parse_field(name: &'static str, spec: &str, min: u32, max: u32) -> Result<Field> {
    let err = |reason: String| CronError::InvalidField {
        field: name,
        value: spec.to_string(),
        reason,
    };

    if spec == "*" {
        return Ok(Field {
            unrestricted: true,
            allowed: (min..=max).collect(),
        });
    }

    let mut allowed = Vec::new();
    for element in spec.split(',') {
        if element.is_empty() {
            return Err(err("empty list element".to_string()));
        }

        let (base, step) = match element.split_once('/') {
            Some((base, step_str)) => {
                let step: u32 = step_str
                    .parse()
                    .map_err(|_| err(format!("bad step '{step_str}'")))?;
                if step == 0 {
                    return Err(err("step must be at least 1".to_string()));
                }
                (base, step)
            }
            None => (element, 1),
        };

        let (start, end) = if base == "*" {
            (min, max)
        } else if let Some((lo, hi)) = base.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| err(format!("bad number '{lo}'")))?;
            let hi: u32 = hi.parse().map_err(|_| err(format!("bad number '{hi}'")))?;
            if lo > hi {
                return Err(err(format!("range {lo}-{hi} is inverted")));
            }
            (lo, hi)
        } else {
            let v: u32 = base
                .parse()
                .map_err(|_| err(format!("bad number '{base}'")))?;
            (v, v)
        };

        if start < min || end > max {
            return Err(err(format!("values must be within {min}-{max}")));
        }

        allowed.extend((start..=end).step_by(step as usize));
    }

    allowed.sort_unstable();
    allowed.dedup();
    Ok(Field {
        unrestricted: false,
        allowed,
    })
}

/// Day-of-week accepts 0-7 on the wire, with 7 as an alias for Sunday.
fn parse_weekday_field(spec: &str) -> Result<Field> {
    let mut field = parse_field("day-of-week", spec, 0, 7)?;
    if field.allowed.last() == Some(&7) {
        field.allowed.pop();
        if !field.contains(0) {
            field.allowed.insert(0, 0);
        }
    }
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        assert_eq!(
            CronExpr::parse("* * *"),
            Err(CronError::FieldCount { found: 3 })
        );
        assert!(CronExpr::parse("").is_err());
        assert!(CronExpr::parse("* * * * * *").is_err());
    }

    #[test]
    fn parse_rejects_out_of_range_values() {
        assert!(CronExpr::parse("60 * * * *").is_err());
        assert!(CronExpr::parse("* 24 * * *").is_err());
        assert!(CronExpr::parse("* * 0 * *").is_err());
        assert!(CronExpr::parse("* * * 13 *").is_err());
        assert!(CronExpr::parse("* * * * 8").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(CronExpr::parse("a b c d e").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("5-1 * * * *").is_err());
        assert!(CronExpr::parse("1,,2 * * * *").is_err());
    }

    #[test]
    fn wildcard_matches_any_minute() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        assert!(expr.matches(&at(2026, 3, 14, 9, 26)));
    }

    #[test]
    fn lists_ranges_and_steps() {
        let expr = CronExpr::parse("0,30 9-17 * * 1-5").unwrap();
        // Monday 2026-03-09 09:30
        assert!(expr.matches(&at(2026, 3, 9, 9, 30)));
        // Saturday is outside 1-5
        assert!(!expr.matches(&at(2026, 3, 14, 9, 30)));
        // :15 is not in the minute list
        assert!(!expr.matches(&at(2026, 3, 9, 9, 15)));

        let every_quarter = CronExpr::parse("*/15 * * * *").unwrap();
        assert!(every_quarter.matches(&at(2026, 1, 1, 0, 45)));
        assert!(!every_quarter.matches(&at(2026, 1, 1, 0, 50)));

        let ranged_step = CronExpr::parse("10-30/10 * * * *").unwrap();
        assert!(ranged_step.matches(&at(2026, 1, 1, 0, 10)));
        assert!(ranged_step.matches(&at(2026, 1, 1, 0, 30)));
        assert!(!ranged_step.matches(&at(2026, 1, 1, 0, 25)));
    }

    #[test]
    fn sunday_seven_normalises_to_zero() {
        let with_seven = CronExpr::parse("0 0 * * 7").unwrap();
        // 2026-03-08 is a Sunday.
        assert!(with_seven.matches(&at(2026, 3, 8, 0, 0)));
        assert_eq!(with_seven, CronExpr::parse("0 0 * * 0").unwrap());
    }

    #[test]
    fn next_after_is_strictly_greater() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        let t = at(2026, 5, 1, 12, 0);
        assert_eq!(expr.next_after(&t).unwrap(), at(2026, 5, 1, 12, 1));
    }

    #[test]
    fn next_after_daily_midnight() {
        let expr = CronExpr::parse("0 0 * * *").unwrap();
        assert_eq!(
            expr.next_after(&at(2026, 5, 1, 12, 30)).unwrap(),
            at(2026, 5, 2, 0, 0)
        );
        // From one midnight exactly, the next is tomorrow's.
        assert_eq!(
            expr.next_after(&at(2026, 5, 1, 0, 0)).unwrap(),
            at(2026, 5, 2, 0, 0)
        );
    }

    #[test]
    fn next_after_crosses_month_and_year() {
        let expr = CronExpr::parse("0 9 1 * *").unwrap();
        assert_eq!(
            expr.next_after(&at(2026, 1, 15, 0, 0)).unwrap(),
            at(2026, 2, 1, 9, 0)
        );
        let yearly = CronExpr::parse("30 6 1 1 *").unwrap();
        assert_eq!(
            yearly.next_after(&at(2026, 3, 1, 0, 0)).unwrap(),
            at(2027, 1, 1, 6, 30)
        );
    }

    #[test]
    fn next_after_leap_day() {
        let expr = CronExpr::parse("0 0 29 2 *").unwrap();
        assert_eq!(
            expr.next_after(&at(2027, 1, 1, 0, 0)).unwrap(),
            at(2028, 2, 29, 0, 0)
        );
    }

    #[test]
    fn impossible_date_returns_none() {
        let expr = CronExpr::parse("0 0 31 2 *").unwrap();
        assert_eq!(expr.next_after(&at(2026, 1, 1, 0, 0)), None);
    }

    #[test]
    fn dom_dow_or_rule() {
        // "the 13th, or any Friday"
        let expr = CronExpr::parse("0 0 13 * 5").unwrap();
        // 2026-03-13 is a Friday — matches both.
        assert!(expr.matches(&at(2026, 3, 13, 0, 0)));
        // 2026-04-13 is a Monday — matches via day-of-month alone.
        assert!(expr.matches(&at(2026, 4, 13, 0, 0)));
        // 2026-03-06 is a Friday — matches via day-of-week alone.
        assert!(expr.matches(&at(2026, 3, 6, 0, 0)));
        // 2026-03-12 is a Thursday, not the 13th.
        assert!(!expr.matches(&at(2026, 3, 12, 0, 0)));

        // With day-of-month unrestricted, only the weekday decides.
        let fridays = CronExpr::parse("0 0 * * 5").unwrap();
        assert!(!fridays.matches(&at(2026, 4, 13, 0, 0)));
    }

    #[test]
    fn is_due_uses_reference_not_wall_clock() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        let created = at(2026, 1, 1, 10, 0);
        assert!(!expr.is_due(&created, &created));
        assert!(expr.is_due(&created, &at(2026, 1, 1, 10, 1)));

        let hourly = CronExpr::parse("0 * * * *").unwrap();
        let last_run = at(2026, 1, 1, 10, 0);
        assert!(!hourly.is_due(&last_run, &at(2026, 1, 1, 10, 59)));
        assert!(hourly.is_due(&last_run, &at(2026, 1, 1, 11, 0)));
    }

    #[test]
    fn determinism() {
        let expr = CronExpr::parse("*/7 3 * * *").unwrap();
        let t = at(2026, 6, 6, 1, 2);
        assert_eq!(expr.next_after(&t), expr.next_after(&t));
    }
}
