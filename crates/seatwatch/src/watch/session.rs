/// Per-watch state and the decisions made on each tick
use crate::catalog::{CourseQuery, SeatSnapshot};
use crate::notify::Opening;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Shortest allowed time between catalog checks.
pub const MIN_INTERVAL: Duration = Duration::from_secs(120);

/// Clamps a requested check interval to [`MIN_INTERVAL`].
///
/// No request, or anything under two minutes, gives exactly two minutes.
pub fn effective_interval(requested_secs: Option<u64>) -> Duration {
    requested_secs
        .map(Duration::from_secs)
        .filter(|interval| *interval >= MIN_INTERVAL)
        .unwrap_or(MIN_INTERVAL)
}

/// Formats a countdown as `N mins M secs`.
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{} mins {} secs", secs / 60, secs % 60)
}

/// When to email about an opening that is still open on a later check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Every check that finds an opening sends an email
    EveryTick,
    /// Only a new or changed opening sends an email
    #[default]
    OnChange,
}

/// What a tick should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Interval not elapsed; this much is left
    Countdown(Duration),
    /// Interval elapsed; fetch now
    Check,
}

/// One running watch.
#[derive(Debug, Clone)]
pub struct WatchSession {
    pub query: CourseQuery,
    /// Recipient of opening notices
    pub email: String,
    pub interval: Duration,
    pub notify_on_waitlist: bool,
    pub last_snapshot: SeatSnapshot,
    pub notifications_sent: u32,
    remaining: Duration,
    last_notified: Option<Opening>,
}

impl WatchSession {
    pub fn new(
        query: CourseQuery,
        email: impl Into<String>,
        requested_interval_secs: Option<u64>,
        notify_on_waitlist: bool,
    ) -> Self {
        let interval = effective_interval(requested_interval_secs);
        Self {
            query,
            email: email.into(),
            interval,
            notify_on_waitlist,
            last_snapshot: SeatSnapshot::zero(),
            notifications_sent: 0,
            remaining: interval,
            last_notified: None,
        }
    }

    /// Time left until the next check.
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Advances the countdown by one nominal tick.
    pub fn tick(&mut self, cadence: Duration) -> Tick {
        self.remaining = self.remaining.saturating_sub(cadence);
        if self.remaining.is_zero() {
            self.remaining = self.interval;
            Tick::Check
        } else {
            Tick::Countdown(self.remaining)
        }
    }

    /// The opening worth reporting in `snapshot`, if any.
    ///
    /// Open seats always count. Open waitlist seats only count when there are
    /// no open seats and the user asked for waitlist notices.
    pub fn opening_in(&self, snapshot: &SeatSnapshot) -> Option<Opening> {
        if snapshot.seats.remaining > 0 {
            Some(Opening::seats(snapshot.seats.remaining))
        } else if snapshot.waitlist.remaining > 0 && self.notify_on_waitlist {
            Some(Opening::waitlist(snapshot.waitlist.remaining))
        } else {
            None
        }
    }

    /// Stores a fresh snapshot and returns the opening that should be emailed.
    ///
    /// Call [`WatchSession::mark_notified`] once the email has gone out.
    pub fn record(
        &mut self,
        snapshot: SeatSnapshot,
        policy: NotifyPolicy,
        max_notifications: Option<u32>,
    ) -> Option<Opening> {
        self.last_snapshot = snapshot;

        let Some(opening) = self.opening_in(&snapshot) else {
            self.last_notified = None;
            return None;
        };

        if policy == NotifyPolicy::OnChange && self.last_notified == Some(opening) {
            debug!(course = %self.query, opening = %opening, "Opening already notified");
            return None;
        }

        if max_notifications.is_some_and(|max| self.notifications_sent >= max) {
            debug!(
                course = %self.query,
                sent = self.notifications_sent,
                "Notification limit reached"
            );
            return None;
        }

        Some(opening)
    }

    pub fn mark_notified(&mut self, opening: Opening) {
        self.last_notified = Some(opening);
        self.notifications_sent += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SeatCounts, Term};

    fn session(notify_on_waitlist: bool) -> WatchSession {
        WatchSession::new(
            CourseQuery::new("SENG", 275, "A01", Term::Fall),
            "bob@uvic.ca",
            Some(120),
            notify_on_waitlist,
        )
    }

    fn snapshot(seats: u32, waitlist: u32) -> SeatSnapshot {
        SeatSnapshot {
            seats: SeatCounts::new(30, 30 - seats, seats),
            waitlist: SeatCounts::new(10, 10 - waitlist, waitlist),
        }
    }

    #[test]
    fn test_interval_floor() {
        assert_eq!(effective_interval(Some(30)), Duration::from_secs(120));
        assert_eq!(effective_interval(Some(119)), Duration::from_secs(120));
        assert_eq!(effective_interval(None), Duration::from_secs(120));
        assert_eq!(effective_interval(Some(120)), Duration::from_secs(120));
        assert_eq!(effective_interval(Some(300)), Duration::from_secs(300));
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::from_secs(125)), "2 mins 5 secs");
        assert_eq!(format_countdown(Duration::from_secs(59)), "0 mins 59 secs");
    }

    #[test]
    fn test_tick_counts_down_then_checks() {
        let mut s = session(false);
        let second = Duration::from_secs(1);

        assert_eq!(s.tick(second), Tick::Countdown(Duration::from_secs(119)));
        for _ in 0..118 {
            assert!(matches!(s.tick(second), Tick::Countdown(_)));
        }
        assert_eq!(s.tick(second), Tick::Check);
        assert_eq!(s.remaining(), Duration::from_secs(120));
    }

    #[test]
    fn test_seats_always_notify() {
        let mut s = session(false);
        assert_eq!(
            s.record(snapshot(3, 5), NotifyPolicy::OnChange, None),
            Some(Opening::seats(3))
        );
    }

    #[test]
    fn test_waitlist_requires_opt_in() {
        let mut s = session(false);
        assert_eq!(s.record(snapshot(0, 5), NotifyPolicy::OnChange, None), None);

        let mut s = session(true);
        assert_eq!(
            s.record(snapshot(0, 5), NotifyPolicy::OnChange, None),
            Some(Opening::waitlist(5))
        );
    }

    #[test]
    fn test_on_change_suppresses_repeats_and_rearms() {
        let mut s = session(false);

        let opening = s.record(snapshot(3, 0), NotifyPolicy::OnChange, None).unwrap();
        s.mark_notified(opening);
        assert_eq!(s.record(snapshot(3, 0), NotifyPolicy::OnChange, None), None);

        // count changed
        assert_eq!(
            s.record(snapshot(2, 0), NotifyPolicy::OnChange, None),
            Some(Opening::seats(2))
        );

        s.mark_notified(Opening::seats(2));
        assert_eq!(s.record(snapshot(0, 0), NotifyPolicy::OnChange, None), None);
        assert_eq!(
            s.record(snapshot(2, 0), NotifyPolicy::OnChange, None),
            Some(Opening::seats(2))
        );
    }

    #[test]
    fn test_every_tick_repeats() {
        let mut s = session(false);
        for _ in 0..3 {
            let opening = s.record(snapshot(1, 0), NotifyPolicy::EveryTick, None).unwrap();
            s.mark_notified(opening);
        }
        assert_eq!(s.notifications_sent, 3);
    }

    #[test]
    fn test_max_notifications() {
        let mut s = session(false);
        let opening = s.record(snapshot(1, 0), NotifyPolicy::EveryTick, Some(1)).unwrap();
        s.mark_notified(opening);

        assert_eq!(s.record(snapshot(1, 0), NotifyPolicy::EveryTick, Some(1)), None);
        assert_eq!(s.last_snapshot, snapshot(1, 0));
    }
}
