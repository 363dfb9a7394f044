use std::fmt;

/// Time left on a deal's clock, computed from wall-clock time and the
/// server-fixed expiry timestamp. Pure; the per-second tick cadence belongs
/// to whoever owns the session timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    Remaining { hours: u64, minutes: u64, seconds: u64 },
    Expired,
}

impl Countdown {
    /// Compute the countdown at `now_millis` toward `expires_at_millis`.
    ///
    /// Durations are never negative: anything at or past the deadline is
    /// `Expired`, a signal distinct from ticking text.
    pub fn until(expires_at_millis: i64, now_millis: i64) -> Countdown {
        let remaining_ms = expires_at_millis - now_millis;
        if remaining_ms <= 0 {
            return Countdown::Expired;
        }
        let total_seconds = (remaining_ms / 1_000) as u64;
        Countdown::Remaining {
            hours: total_seconds / 3_600,
            minutes: (total_seconds % 3_600) / 60,
            seconds: total_seconds % 60,
        }
    }

    pub fn is_expired(self) -> bool {
        self == Countdown::Expired
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::Remaining {
                hours,
                minutes,
                seconds,
            } => write!(f, "{}h {}m {}s", hours, minutes, seconds),
            Countdown::Expired => write!(f, "expired"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hour_one_minute_one_second() {
        let now = 1_000_000;
        let countdown = Countdown::until(now + 3_661 * 1_000, now);
        assert_eq!(
            countdown,
            Countdown::Remaining {
                hours: 1,
                minutes: 1,
                seconds: 1
            }
        );
        assert_eq!(countdown.to_string(), "1h 1m 1s");
    }

    #[test]
    fn past_deadline_is_expired_never_negative() {
        let now = 1_000_000;
        assert_eq!(Countdown::until(now - 1, now), Countdown::Expired);
        assert_eq!(Countdown::until(now, now), Countdown::Expired);
        assert_eq!(Countdown::until(0, now), Countdown::Expired);
    }

    #[test]
    fn sub_second_remainder_still_ticks() {
        let now = 1_000_000;
        // 500ms left rounds down to 0h 0m 0s but is not yet expired.
        assert_eq!(
            Countdown::until(now + 500, now),
            Countdown::Remaining {
                hours: 0,
                minutes: 0,
                seconds: 0
            }
        );
    }
}
