// src/notify/cooldown.rs
use chrono::{DateTime, Duration, Utc};

/// Minimum spacing between two alerts of the same kind.
/// - No previous alert: fire.
/// - Inside the window: suppress.
///
/// Stateless; the caller keeps `last` in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    window: Duration,
}

impl Cooldown {
    /// Negative windows are treated as zero (no cooldown).
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::zero()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn should_fire(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last {
            None => true,
            Some(ts) => now.signed_duration_since(ts) >= self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn first_alert_passes() {
        assert!(Cooldown::new(Duration::minutes(60)).should_fire(None, t0()));
    }

    #[test]
    fn inside_window_blocked() {
        let c = Cooldown::new(Duration::minutes(60));
        assert!(!c.should_fire(Some(t0()), t0() + Duration::minutes(59)));
    }

    #[test]
    fn at_and_after_window_passes() {
        let c = Cooldown::new(Duration::minutes(60));
        assert!(c.should_fire(Some(t0()), t0() + Duration::minutes(60)));
        assert!(c.should_fire(Some(t0()), t0() + Duration::minutes(61)));
    }

    #[test]
    fn negative_window_is_zero() {
        let c = Cooldown::new(Duration::seconds(-5));
        assert_eq!(c.window(), Duration::zero());
        assert!(c.should_fire(Some(t0()), t0()));
    }
}
