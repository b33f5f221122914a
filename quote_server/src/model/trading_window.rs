//! Trading-hours gate.
//!
//! A [`TradingWindow`] answers "is the market open at this instant" from the wall clock
//! alone. Sessions are half-open `[start, end)` intervals in the exchange's local time.
//! There is no holiday calendar: on an exchange holiday the gate reports open during session
//! hours and the poller simply refreshes unchanged quotes.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use quote_common::QuoteError;

/// Predicate deciding whether a scheduled refresh should run at `now`.
pub trait MarketGate: Send + Sync {
    /// Whether refreshing is worthwhile at `now`.
    fn is_open(&self, now: DateTime<Utc>) -> bool;
}

/// Gate that never closes; used when a scheduler is configured ungated.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOpen;

impl MarketGate for AlwaysOpen {
    fn is_open(&self, _now: DateTime<Utc>) -> bool {
        true
    }
}

/// One continuous trading session, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// First minute inside the session.
    pub start: NaiveTime,
    /// First minute after the session.
    pub end: NaiveTime,
}

impl Session {
    /// Build a session from `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, QuoteError> {
        let start = parse_hhmm(start)?;
        let end = parse_hhmm(end)?;
        if end <= start {
            return Err(QuoteError::Config(format!(
                "session end {} is not after start {}",
                end, start
            )));
        }
        Ok(Session { start, end })
    }

    /// Whether `time` falls inside the session.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }
}

fn parse_hhmm(raw: &str) -> Result<NaiveTime, QuoteError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| QuoteError::Config(format!("invalid session time {:?}: {}", raw, e)))
}

/// Exchange sessions in a given time zone.
#[derive(Debug, Clone)]
pub struct TradingWindow {
    sessions: Vec<Session>,
    timezone: Tz,
}

impl TradingWindow {
    /// Create a window from explicit sessions.
    pub fn new(sessions: Vec<Session>, timezone: Tz) -> Self {
        Self { sessions, timezone }
    }

    /// Shanghai/Shenzhen continuous auction: 09:30-11:30 and 13:00-15:00, Asia/Shanghai.
    pub fn china_a_shares() -> Self {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
        Self::new(
            vec![
                Session {
                    start: hm(9, 30),
                    end: hm(11, 30),
                },
                Session {
                    start: hm(13, 0),
                    end: hm(15, 0),
                },
            ],
            chrono_tz::Asia::Shanghai,
        )
    }

    /// Whether the exchange-local `time` falls in any session.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.sessions.iter().any(|s| s.contains(time))
    }

    /// Configured sessions.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Exchange time zone.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl MarketGate for TradingWindow {
    fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.contains(now.with_timezone(&self.timezone).time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn morning_open_midday_closed() {
        let window = TradingWindow::china_a_shares();
        assert!(window.contains(at(10, 0)));
        assert!(!window.contains(at(12, 0)));
        assert!(window.contains(at(14, 59)));
        assert!(!window.contains(at(8, 0)));
    }

    #[test]
    fn sessions_are_half_open() {
        let window = TradingWindow::china_a_shares();
        assert!(window.contains(at(9, 30)));
        assert!(!window.contains(at(11, 30)));
        assert!(window.contains(at(13, 0)));
        assert!(!window.contains(at(15, 0)));
    }

    #[test]
    fn gate_converts_to_exchange_time() {
        let window = TradingWindow::china_a_shares();
        // 02:00 UTC is 10:00 in Shanghai.
        let open = Utc.with_ymd_and_hms(2025, 3, 4, 2, 0, 0).unwrap();
        // 04:00 UTC is 12:00 in Shanghai.
        let lunch = Utc.with_ymd_and_hms(2025, 3, 4, 4, 0, 0).unwrap();
        assert!(window.is_open(open));
        assert!(!window.is_open(lunch));
    }

    #[test]
    fn session_parse_validates_order() {
        assert_eq!(
            Session::parse("09:30", "11:30").unwrap(),
            Session {
                start: at(9, 30),
                end: at(11, 30)
            }
        );
        assert!(matches!(Session::parse("11:30", "09:30"), Err(QuoteError::Config(_))));
        assert!(matches!(Session::parse("9h30", "11:30"), Err(QuoteError::Config(_))));
    }
}
