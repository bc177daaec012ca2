/// Time windows and series sanitation.
///
/// Upstream sources are not guaranteed to respect a requested window or to
/// use a single date format, so every external series passes through
/// [`window_series`] before it is considered chartable. This stage is the
/// boundary between "untrusted external series" and "clean series": it
/// parses flexible date formats, discards non-finite values, and filters
/// to the requested window. It never re-sorts — callers needing sorted
/// output sort explicitly.

use chrono::{DateTime, Duration, Utc};

use crate::ingest::raw::parse_flexible_datetime;
use crate::model::SeriesPoint;

// ---------------------------------------------------------------------------
// Time window
// ---------------------------------------------------------------------------

/// The window presets offered by the dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Last24h,
    Last7d,
    Last30d,
    All,
}

impl WindowKind {
    /// The span of the window, `None` for the unbounded preset.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            WindowKind::Last24h => Some(Duration::hours(24)),
            WindowKind::Last7d => Some(Duration::days(7)),
            WindowKind::Last30d => Some(Duration::days(30)),
            WindowKind::All => None,
        }
    }
}

/// A bounded or unbounded time interval used to filter measurements and
/// series. `start` is `None` exactly when `kind` is `All`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub kind: WindowKind,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Builds the window ending at `end`, with `start` derived from the
    /// preset span. Accepting `end` rather than reading the clock keeps
    /// windowing deterministic in tests.
    pub fn ending_at(kind: WindowKind, end: DateTime<Utc>) -> Self {
        TimeWindow {
            kind,
            start: kind.duration().map(|d| end - d),
            end,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some()
    }

    /// Whether an instant falls inside the window. Unbounded windows
    /// contain every instant — the `all` preset excludes nothing by date.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        match self.start {
            Some(start) => start <= t && t <= self.end,
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Series sanitation
// ---------------------------------------------------------------------------

/// A raw series point as extracted from an external response, before any
/// validation. Either field may be absent or garbage.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub time: Option<String>,
    pub value: Option<f64>,
}

/// Cleans a raw series against a window:
///
/// 1. points whose value is missing or non-finite are always dropped;
/// 2. for bounded windows, points whose date is missing, unparseable, or
///    outside `[start, end]` are dropped;
/// 3. for the unbounded window, no point is excluded by date — an
///    unparseable date survives as `timestamp: None`.
///
/// Input order is preserved.
pub fn window_series(points: &[RawPoint], window: &TimeWindow) -> Vec<SeriesPoint> {
    let mut out = Vec::new();
    for point in points {
        let value = match point.value {
            Some(v) if v.is_finite() => v,
            _ => continue,
        };
        let parsed = point.time.as_deref().and_then(parse_flexible_datetime);
        if window.is_bounded() {
            match parsed {
                Some(t) if window.contains(t) => {}
                _ => continue,
            }
        }
        out.push(SeriesPoint { timestamp: parsed, value });
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
