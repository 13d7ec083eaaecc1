//! "Now", "today" and the calendar arithmetic built on them.
//!
//! Today is the calendar date of the current instant in the project timezone:
//! `VERGE_TIMEZONE`, else the `timezone` key of `verge-time.toml`, else UTC.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

const TIMEZONE_ENV_VAR: &str = "VERGE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "VERGE_TIME_CONFIG";
const TIMEZONE_CONFIG_FILE: &str = "verge-time.toml";

static RELATIVE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$").ok());

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        to_project_date(self.now())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Cell<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    /// Noon UTC on `date`, so any timezone within twelve hours of UTC sees
    /// the same calendar day.
    pub fn at_date(date: NaiveDate) -> Self {
        Self::new(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
    }

    pub fn advance_days(&self, days: i64) {
        self.now.set(self.now.get() + Duration::days(days));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

pub fn project_timezone() -> Tz {
    static PROJECT_TZ: OnceLock<Tz> = OnceLock::new();
    *PROJECT_TZ.get_or_init(resolve_project_timezone)
}

#[must_use]
pub fn to_project_date(dt: DateTime<Utc>) -> NaiveDate {
    dt.with_timezone(&project_timezone()).date_naive()
}

/// Whole calendar days from `today` to `deadline`; negative once it passed.
#[must_use]
pub fn days_until(deadline: NaiveDate, today: NaiveDate) -> i64 {
    deadline.signed_duration_since(today).num_days()
}

/// `Jan 10, 2024`
#[must_use]
pub fn format_display_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

#[derive(Debug, Deserialize)]
struct TimeFile {
    timezone: Option<String>,
    time: Option<TimeSection>,
}

#[derive(Debug, Deserialize)]
struct TimeSection {
    timezone: Option<String>,
}

fn resolve_project_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR)
        && let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
        return tz;
    }

    let path = match std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        Ok(raw) if !raw.trim().is_empty() => Some(PathBuf::from(raw.trim())),
        _ => std::env::current_dir()
            .ok()
            .map(|dir| dir.join(TIMEZONE_CONFIG_FILE)),
    };
    if let Some(tz) = path.as_deref().and_then(timezone_from_file) {
        return tz;
    }

    debug!("no project timezone configured; using UTC");
    chrono_tz::UTC
}

fn timezone_from_file(path: &Path) -> Option<Tz> {
    if !path.exists() {
        return None;
    }
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| toml::from_str::<TimeFile>(&raw).map_err(anyhow::Error::from));
    let file = match parsed {
        Ok(file) => file,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "ignoring unreadable timezone file");
            return None;
        }
    };

    let name = file.timezone.or_else(|| file.time.and_then(|t| t.timezone))?;
    parse_timezone(&name, &path.display().to_string())
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    match raw.trim().parse::<Tz>() {
        Ok(tz) => {
            info!(source, timezone = %tz, "configured project timezone");
            Some(tz)
        }
        Err(err) => {
            warn!(source, timezone = raw, error = %err, "ignoring invalid timezone");
            None
        }
    }
}

/// Parses a deadline expression relative to `today`: `today`, `tomorrow`,
/// `yesterday`, a weekday (next occurrence, never today), a month (the 1st of
/// its next occurrence), `+Nd`/`-Nd`/`+Nw`, or `YYYY-MM-DD`.
#[instrument(skip(today))]
pub fn parse_date_expr(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let lower = input.trim().to_ascii_lowercase();

    let parsed = match lower.as_str() {
        "today" => Some(today),
        "tomorrow" => today.succ_opt(),
        "yesterday" => today.pred_opt(),
        word => match (weekday_named(word), month_named(word)) {
            (Some(weekday), _) => Some(next_weekday(today, weekday)),
            (_, Some(month)) => next_month_start(today, month),
            _ => None,
        },
    };
    if let Some(date) = parsed {
        return Ok(date);
    }

    if let Some(caps) = RELATIVE_RE.as_ref().and_then(|re| re.captures(&lower)) {
        let num: i64 = caps["num"].parse().context("relative amount too large")?;
        let span = if &caps["unit"] == "w" {
            Duration::weeks(num)
        } else {
            Duration::days(num)
        };
        let shifted = if &caps["sign"] == "-" {
            today.checked_sub_signed(span)
        } else {
            today.checked_add_signed(span)
        };
        return shifted.ok_or_else(|| anyhow!("date out of range: {input}"));
    }

    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").with_context(|| {
        format!(
            "unrecognized date {input:?}; use today, tomorrow, a weekday, a month, \
             +Nd, +Nw or YYYY-MM-DD"
        )
    })
}

fn weekday_named(word: &str) -> Option<Weekday> {
    match word {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

fn month_named(word: &str) -> Option<u32> {
    if word.len() < 3 {
        return None;
    }
    let idx = MONTHS
        .iter()
        .position(|name| *name == word || (word.len() <= 4 && name.starts_with(word)))?;
    u32::try_from(idx + 1).ok()
}

fn next_weekday(from: NaiveDate, target: Weekday) -> NaiveDate {
    let ahead = (7 + i64::from(target.num_days_from_monday())
        - i64::from(from.weekday().num_days_from_monday()))
        % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    from + Duration::days(ahead)
}

fn next_month_start(today: NaiveDate, month: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, 1)?;
    if this_year > today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_keywords_and_names() {
        // A Tuesday.
        let today = date(2026, 2, 17);
        let cases = [
            ("tomorrow", date(2026, 2, 18)),
            ("Yesterday", date(2026, 2, 16)),
            ("wednesday", date(2026, 2, 18)),
            ("tue", date(2026, 2, 24)),
            ("march", date(2026, 3, 1)),
            ("sept", date(2026, 9, 1)),
            ("feb", date(2027, 2, 1)),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_date_expr(input, today).expect(input), expected, "{input}");
        }
    }

    #[test]
    fn parses_offsets_and_iso() {
        let today = date(2026, 2, 17);
        assert_eq!(parse_date_expr("+3d", today).expect("offset"), date(2026, 2, 20));
        assert_eq!(parse_date_expr("+2w", today).expect("offset"), date(2026, 3, 3));
        assert_eq!(parse_date_expr("-1d", today).expect("offset"), date(2026, 2, 16));
        assert_eq!(
            parse_date_expr(" 2024-01-10 ", today).expect("iso"),
            date(2024, 1, 10)
        );
    }

    #[test]
    fn rejects_garbage() {
        let today = date(2026, 2, 17);
        for input in ["someday", "ma", "2024-13-01", "+3y"] {
            assert!(parse_date_expr(input, today).is_err(), "{input}");
        }
    }

    #[test]
    fn days_until_counts_calendar_days() {
        let today = date(2024, 1, 9);
        assert_eq!(days_until(date(2024, 1, 10), today), 1);
        assert_eq!(days_until(today, today), 0);
        assert_eq!(days_until(date(2024, 1, 6), today), -3);
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::at_date(date(2024, 1, 9));
        clock.advance_days(2);
        assert_eq!(clock.now().date_naive(), date(2024, 1, 11));
    }

    #[test]
    fn display_date_is_short_month() {
        assert_eq!(format_display_date(date(2024, 1, 10)), "Jan 10, 2024");
    }
}
