//! Window planning for the windowed passes
//!
//! The listing API limits how much history one call may cover, so every pass
//! walks the crawl range one calendar month at a time. Planning is a pure
//! function of the range: no clock, no I/O.

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;

/// Timestamp layout the Trading API expects in filters
const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// The temporal filter a pass applies to the listing API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    /// All listings regardless of date, walked through the selling lists
    Unbounded,

    /// Listings that started inside the window
    StartTime,

    /// Listings that ended inside the window
    EndTime,

    /// Listings modified inside the window
    ModTime,
}

impl PassKind {
    /// The windowed passes in their default order
    pub const WINDOWED: [PassKind; 3] = [PassKind::StartTime, PassKind::EndTime, PassKind::ModTime];

    /// Element name prefix of the `GetSellerList` filter pair
    /// (`StartTimeFrom`/`StartTimeTo` and so on)
    pub fn filter_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Unbounded => None,
            Self::StartTime => Some("StartTime"),
            Self::EndTime => Some("EndTime"),
            Self::ModTime => Some("ModTime"),
        }
    }

    /// Name recorded in the ledger's `source` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unbounded => "Unbounded",
            Self::StartTime => "StartTime",
            Self::EndTime => "EndTime",
            Self::ModTime => "ModTime",
        }
    }

    /// Parses a ledger `source` value
    pub fn from_ledger_str(s: &str) -> Option<Self> {
        match s {
            "Unbounded" => Some(Self::Unbounded),
            "StartTime" => Some(Self::StartTime),
            "EndTime" => Some(Self::EndTime),
            "ModTime" => Some(Self::ModTime),
            _ => None,
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded interval one pass pages through
///
/// `from` is the first second of the window and `to` the last one, both
/// inclusive, so consecutive windows of a pass satisfy
/// `next.from == prev.to + 1s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlWindow {
    pub kind: PassKind,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl CrawlWindow {
    /// The single nominal window of the unbounded scan
    ///
    /// The bounds are informational (they end up in the ledger); the
    /// unbounded scan does not send them to the API.
    pub fn unbounded(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            kind: PassKind::Unbounded,
            from: from.min(to),
            to,
        }
    }

    /// Lower bound in the API's timestamp format
    pub fn from_iso(&self) -> String {
        self.from.format(API_TIME_FORMAT).to_string()
    }

    /// Upper bound in the API's timestamp format
    pub fn to_iso(&self) -> String {
        self.to.format(API_TIME_FORMAT).to_string()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.from.date_naive()
    }

    pub fn last_day(&self) -> NaiveDate {
        self.to.date_naive()
    }
}

impl fmt::Display for CrawlWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.kind, self.first_day(), self.last_day())
    }
}

/// Plans the month-aligned windows covering `[start, end]` inclusive
///
/// The first window always begins on the first day of `start`'s month and the
/// last one is clipped at the end of `end`. An inverted range yields no
/// windows.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use listing_archiver::crawler::{plan_windows, PassKind};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
/// let windows = plan_windows(PassKind::StartTime, start, end);
/// assert_eq!(windows.len(), 3);
/// assert_eq!(windows[1].last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
/// ```
pub fn plan_windows(kind: PassKind, start: NaiveDate, end: NaiveDate) -> Vec<CrawlWindow> {
    let mut windows = Vec::new();
    if start > end {
        return windows;
    }

    let Some(mut month_start) = NaiveDate::from_ymd_opt(start.year(), start.month(), 1) else {
        return windows;
    };

    while month_start <= end {
        let next_month = month_start.checked_add_months(Months::new(1));
        let month_end = next_month
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        let last_day = month_end.min(end);

        let (Some(from), Some(to)) = (start_of_day(month_start), end_of_day(last_day)) else {
            break;
        };
        windows.push(CrawlWindow { kind, from, to });

        match next_month {
            Some(next) => month_start = next,
            None => break,
        }
    }

    windows
}

/// Drops windows that begin after `now` and clamps the final window to `now`
pub fn clamp_to(mut windows: Vec<CrawlWindow>, now: DateTime<Utc>) -> Vec<CrawlWindow> {
    windows.retain(|w| w.from <= now);
    if let Some(last) = windows.last_mut() {
        last.to = last.to.min(now);
    }
    windows
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(23, 59, 59)
        .map(|naive| Utc.from_utc_datetime(&naive))
}
