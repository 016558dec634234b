//! Quiet-hours windows.
//!
//! A window is a pair of "HH:MM" wall-clock times and may wrap midnight
//! (e.g. 22:00 → 08:00). During the global window only high-priority traffic
//! is dispatched; a destination's personal window suppresses everything for
//! that destination.

use chrono::NaiveTime;

use courier_common::error::AppError;
use courier_common::types::CommunicationPreference;

/// A daily time window, possibly wrapping midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl QuietWindow {
    /// Parse a window from two "HH:MM" strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        Ok(Self {
            start: parse_hhmm(start)?,
            end: parse_hhmm(end)?,
        })
    }

    /// Whether `t` falls inside the window.
    ///
    /// A wrapping window (start > end) covers [start, midnight) ∪ [midnight, end).
    /// A degenerate window (start == end) is treated as empty.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start == self.end {
            false
        } else if self.start < self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }

    /// Build the optional personal window from a destination preference.
    /// Both fields must be present and valid; a malformed pair is ignored
    /// rather than blocking delivery.
    pub fn from_preference(pref: &CommunicationPreference) -> Option<Self> {
        match (&pref.quiet_start, &pref.quiet_end) {
            (Some(start), Some(end)) => Self::parse(start, end).ok(),
            _ => None,
        }
    }
}

fn parse_hhmm(raw: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| AppError::Config(format!("Invalid quiet-hours time '{}', expected HH:MM", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_valid() {
        let w = QuietWindow::parse("22:00", "08:00").unwrap();
        assert!(w.contains(t(23, 0)));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(QuietWindow::parse("25:00", "08:00").is_err());
        assert!(QuietWindow::parse("22", "08:00").is_err());
        assert!(QuietWindow::parse("", "08:00").is_err());
    }

    #[test]
    fn test_simple_window() {
        let w = QuietWindow::parse("09:00", "17:00").unwrap();
        assert!(w.contains(t(9, 0)));
        assert!(w.contains(t(12, 30)));
        assert!(!w.contains(t(17, 0)));
        assert!(!w.contains(t(8, 59)));
        assert!(!w.contains(t(22, 0)));
    }

    #[test]
    fn test_wrapping_window() {
        let w = QuietWindow::parse("22:00", "08:00").unwrap();
        assert!(w.contains(t(22, 0)));
        assert!(w.contains(t(23, 59)));
        assert!(w.contains(t(0, 0)));
        assert!(w.contains(t(7, 59)));
        assert!(!w.contains(t(8, 0)));
        assert!(!w.contains(t(12, 0)));
    }

    #[test]
    fn test_degenerate_window_is_empty() {
        let w = QuietWindow::parse("08:00", "08:00").unwrap();
        assert!(!w.contains(t(8, 0)));
        assert!(!w.contains(t(20, 0)));
    }

    #[test]
    fn test_from_preference() {
        let mut pref = CommunicationPreference {
            id: Uuid::new_v4(),
            destination: "+15550100".to_string(),
            sms_enabled: true,
            quiet_start: Some("21:00".to_string()),
            quiet_end: Some("07:00".to_string()),
            updated_at: Utc::now(),
        };
        assert!(QuietWindow::from_preference(&pref).is_some());

        pref.quiet_end = None;
        assert!(QuietWindow::from_preference(&pref).is_none());

        pref.quiet_end = Some("not-a-time".to_string());
        assert!(QuietWindow::from_preference(&pref).is_none());
    }
}
