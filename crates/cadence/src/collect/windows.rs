//! Date-window planning for the run listing phase.
//!
//! The listing endpoint caps how many results a single query can page
//! through, so a collection range is chunked into windows and any window
//! that saturates the cap is bisected until it fits.

use chrono::{DateTime, TimeDelta, Utc};

/// Default width of a listing window.
pub const DEFAULT_WINDOW: TimeDelta = TimeDelta::days(7);

/// Windows narrower than this are never split further; a saturated
/// sub-hour window is accepted as-is with a warning.
pub const MIN_WINDOW: TimeDelta = TimeDelta::hours(1);

/// Listing result count at which the API stops paging. A window whose
/// reported total reaches this is treated as saturated.
pub const RESULT_CAP: i64 = 1000;

/// A closed time interval for the listing `created` filter.
///
/// Both endpoints are inclusive, matching the API's range syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    #[must_use]
    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Bisect at the midpoint.
    ///
    /// The right half starts one second past the midpoint so the two
    /// halves never share a boundary second. Returns `None` once the
    /// window is narrower than [`MIN_WINDOW`].
    #[must_use]
    pub fn split(&self) -> Option<(TimeWindow, TimeWindow)> {
        if self.span() < MIN_WINDOW {
            return None;
        }
        let mid = self.start + self.span() / 2;
        Some((
            TimeWindow {
                start: self.start,
                end: mid,
            },
            TimeWindow {
                start: mid + TimeDelta::seconds(1),
                end: self.end,
            },
        ))
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Chunk `[start, end]` into windows of at most `width`.
///
/// Consecutive windows are separated by one second; with inclusive
/// endpoints a shared boundary would list boundary runs twice.
#[must_use]
pub fn plan_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    width: TimeDelta,
) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let stop = (cursor + width).min(end);
        windows.push(TimeWindow {
            start: cursor,
            end: stop,
        });
        cursor = stop + TimeDelta::seconds(1);
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, h, 0, 0).unwrap()
    }

    #[test]
    fn plan_chunks_a_month_into_weeks() {
        let windows = plan_windows(at(1, 0), at(29, 0), DEFAULT_WINDOW);

        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].start, at(1, 0));
        assert_eq!(windows[0].end, at(8, 0));
        // No shared boundary seconds between neighbors.
        assert_eq!(windows[1].start, at(8, 0) + TimeDelta::seconds(1));
        assert_eq!(windows[3].end, at(29, 0));
    }

    #[test]
    fn plan_truncates_the_final_window() {
        let windows = plan_windows(at(1, 0), at(10, 12), DEFAULT_WINDOW);

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end, at(10, 12));
        assert!(windows[1].span() < DEFAULT_WINDOW);
    }

    #[test]
    fn plan_handles_a_range_shorter_than_one_window() {
        let windows = plan_windows(at(1, 0), at(2, 0), DEFAULT_WINDOW);
        assert_eq!(
            windows,
            vec![TimeWindow {
                start: at(1, 0),
                end: at(2, 0),
            }]
        );
    }

    #[test]
    fn split_bisects_without_overlap() {
        let window = TimeWindow {
            start: at(1, 0),
            end: at(8, 0),
        };
        let (left, right) = window.split().unwrap();

        assert_eq!(left.start, window.start);
        assert_eq!(left.end, at(4, 12));
        assert_eq!(right.start, at(4, 12) + TimeDelta::seconds(1));
        assert_eq!(right.end, window.end);
    }

    #[test]
    fn split_stops_below_the_minimum_width() {
        let wide = TimeWindow {
            start: at(1, 0),
            end: at(1, 1),
        };
        assert!(wide.split().is_some());

        let narrow = TimeWindow {
            start: at(1, 0),
            end: at(1, 0) + TimeDelta::minutes(59),
        };
        assert!(narrow.split().is_none());
    }
}
