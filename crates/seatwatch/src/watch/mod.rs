//! The polling loop.
//!
//! A watch runs as one tokio task that owns its [`WatchSession`]:
//! 1. Fetch once so the caller has counts to show
//! 2. Sleep one jittered tick, then count the interval down
//! 3. When the interval runs out, fetch, notify on openings and start over
//!
//! Progress is reported as [`WatchEvent`]s over a channel.

mod session;

pub use session::{
    effective_interval, format_countdown, NotifyPolicy, Tick, WatchSession, MIN_INTERVAL,
};

use crate::catalog::{FetchError, SeatSnapshot, SeatSource};
use crate::notify::{Notifier, NotifyError, Opening};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Configuration for the polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Nominal time between ticks
    pub tick_millis: u64,
    /// Each tick is randomly moved by up to this much either way
    pub jitter_millis: u64,
    pub notify_policy: NotifyPolicy,
    /// Stop emailing after this many notices in one watch
    pub max_notifications: Option<u32>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            tick_millis: 1000,
            jitter_millis: 120,
            notify_policy: NotifyPolicy::default(),
            max_notifications: None,
        }
    }
}

impl WatchConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Checks that the tick can count an interval down.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_millis == 0 {
            return Err("watch.tick_millis must be greater than 0".to_string());
        }
        if self.jitter_millis >= self.tick_millis {
            return Err(format!(
                "watch.jitter_millis ({}) must be less than watch.tick_millis ({})",
                self.jitter_millis, self.tick_millis
            ));
        }
        Ok(())
    }
}

/// Something the watch view may want to show.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Fresh counts from a fetch
    Snapshot(SeatSnapshot),
    /// Time left until the next check
    Countdown(Duration),
    /// An opening notice was sent
    Notified(Opening),
    NotifyFailed { opening: Opening, error: NotifyError },
    /// A fetch failed; the loop carries on
    FetchFailed(FetchError),
}

/// Returns `base` moved by a uniformly random offset in `[-jitter, +jitter]`.
pub fn jittered_delay<R: Rng>(base: Duration, jitter: Duration, rng: &mut R) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    let jitter_ms = i64::try_from(jitter.as_millis()).unwrap_or(i64::MAX);
    let base_ms = i64::try_from(base.as_millis()).unwrap_or(i64::MAX);
    let offset = rng.gen_range(-jitter_ms..=jitter_ms);
    let delay_ms = u64::try_from(base_ms.saturating_add(offset)).unwrap_or(0);
    Duration::from_millis(delay_ms)
}

/// Drives one [`WatchSession`] until stopped.
pub struct WatchLoop<R = StdRng> {
    source: Arc<dyn SeatSource>,
    notifier: Arc<dyn Notifier>,
    config: WatchConfig,
    rng: R,
}

impl WatchLoop<StdRng> {
    pub fn new(
        source: Arc<dyn SeatSource>,
        notifier: Arc<dyn Notifier>,
        config: WatchConfig,
    ) -> Self {
        Self::with_rng(source, notifier, config, StdRng::from_entropy())
    }
}

impl<R: Rng + Send + Sync + 'static> WatchLoop<R> {
    /// Creates a loop drawing tick jitter from `rng`.
    pub fn with_rng(
        source: Arc<dyn SeatSource>,
        notifier: Arc<dyn Notifier>,
        config: WatchConfig,
        rng: R,
    ) -> Self {
        Self {
            source,
            notifier,
            config,
            rng,
        }
    }

    /// Starts polling in a background task.
    pub fn start(self, session: WatchSession) -> WatchHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(self.run(session, event_tx, stop_rx));

        WatchHandle {
            events: event_rx,
            stop_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut session: WatchSession,
        events: mpsc::UnboundedSender<WatchEvent>,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> WatchSession {
        info!(
            course = %session.query,
            term = %session.query.term,
            interval_secs = session.interval.as_secs(),
            notify_on_waitlist = session.notify_on_waitlist,
            "Watch started"
        );

        self.seed(&mut session, &events).await;

        let cadence = self.config.tick();
        let jitter = Duration::from_millis(self.config.jitter_millis);

        loop {
            let delay = jittered_delay(cadence, jitter, &mut self.rng);

            // Only the sleep is cancellable; a fetch in progress always finishes.
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = tokio::time::sleep(delay) => {}
            }

            match session.tick(cadence) {
                Tick::Countdown(remaining) => {
                    let _ = events.send(WatchEvent::Countdown(remaining));
                }
                Tick::Check => self.check(&mut session, &events).await,
            }
        }

        info!(
            course = %session.query,
            notifications_sent = session.notifications_sent,
            "Watch stopped"
        );
        session
    }

    /// First fetch, for display only.
    async fn seed(&self, session: &mut WatchSession, events: &mpsc::UnboundedSender<WatchEvent>) {
        match self.source.fetch(&session.query).await {
            Ok(snapshot) => {
                session.last_snapshot = snapshot;
                let _ = events.send(WatchEvent::Snapshot(snapshot));
            }
            Err(e) => {
                warn!(course = %session.query, error = %e, "Initial fetch failed");
                let _ = events.send(WatchEvent::FetchFailed(e));
            }
        }
    }

    async fn check(&self, session: &mut WatchSession, events: &mpsc::UnboundedSender<WatchEvent>) {
        let snapshot = match self.source.fetch(&session.query).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(course = %session.query, error = %e, "Fetch failed, skipping this check");
                let _ = events.send(WatchEvent::FetchFailed(e));
                return;
            }
        };

        let _ = events.send(WatchEvent::Snapshot(snapshot));

        let Some(opening) = session.record(
            snapshot,
            self.config.notify_policy,
            self.config.max_notifications,
        ) else {
            debug!(course = %session.query, "No opening to report");
            return;
        };

        match self
            .notifier
            .notify(&session.email, opening, &session.query)
            .await
        {
            Ok(()) => {
                session.mark_notified(opening);
                info!(course = %session.query, opening = %opening, "Opening notice sent");
                let _ = events.send(WatchEvent::Notified(opening));
            }
            Err(error) => {
                warn!(course = %session.query, opening = %opening, error = %error, "Opening notice failed");
                let _ = events.send(WatchEvent::NotifyFailed { opening, error });
            }
        }
    }
}

/// Handle to a running watch. Dropping it stops the watch.
pub struct WatchHandle {
    events: mpsc::UnboundedReceiver<WatchEvent>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<WatchSession>,
}

impl WatchHandle {
    /// Waits for the next event. Returns `None` once the loop has ended.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Cancels the pending tick and returns the session.
    ///
    /// A fetch or email already in flight completes first.
    pub async fn stop(self) -> Result<WatchSession, JoinError> {
        let _ = self.stop_tx.send(());
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CourseQuery, SeatCounts, Term};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a script of fetch results, repeating the last one forever.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<SeatSnapshot, FetchError>>>,
        last: Mutex<Option<Result<SeatSnapshot, FetchError>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<SeatSnapshot, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl SeatSource for ScriptedSource {
        async fn fetch(&self, _query: &CourseQuery) -> Result<SeatSnapshot, FetchError> {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                *last = Some(next);
            }
            last.clone().unwrap()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<Opening>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            _address: &str,
            opening: Opening,
            _query: &CourseQuery,
        ) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push(opening);
            Ok(())
        }
    }

    fn snapshot(seats: u32, waitlist: u32) -> SeatSnapshot {
        SeatSnapshot {
            seats: SeatCounts::new(30, 30 - seats, seats),
            waitlist: SeatCounts::new(10, 10 - waitlist, waitlist),
        }
    }

    fn session() -> WatchSession {
        WatchSession::new(
            CourseQuery::new("SENG", 275, "A01", Term::Fall),
            "bob@uvic.ca",
            Some(120),
            false,
        )
    }

    fn start(
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
        config: WatchConfig,
    ) -> WatchHandle {
        WatchLoop::with_rng(source, notifier, config, StdRng::seed_from_u64(7)).start(session())
    }

    /// Reads events until `n` snapshots have been seen, returning everything read.
    async fn collect_snapshots(handle: &mut WatchHandle, n: usize) -> Vec<WatchEvent> {
        let mut seen = Vec::new();
        let mut snapshots = 0;
        while snapshots < n {
            let event = handle.next_event().await.expect("watch ended early");
            if matches!(event, WatchEvent::Snapshot(_)) {
                snapshots += 1;
            }
            seen.push(event);
        }
        seen
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let base = Duration::from_millis(1000);
        let jitter = Duration::from_millis(120);

        for _ in 0..1000 {
            let delay = jittered_delay(base, jitter, &mut rng);
            assert!(delay >= Duration::from_millis(880));
            assert!(delay <= Duration::from_millis(1120));
        }
    }

    #[test]
    fn test_jitter_is_reproducible_with_seed() {
        let base = Duration::from_millis(1000);
        let jitter = Duration::from_millis(120);
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);

        for _ in 0..20 {
            assert_eq!(
                jittered_delay(base, jitter, &mut a),
                jittered_delay(base, jitter, &mut b)
            );
        }
        assert_eq!(jittered_delay(base, Duration::ZERO, &mut a), base);
    }

    #[test]
    fn test_jitter_larger_than_base_does_not_panic() {
        let mut rng = StdRng::seed_from_u64(3);
        let base = Duration::from_millis(1000);

        for _ in 0..100 {
            jittered_delay(base, Duration::from_millis(u64::MAX), &mut rng);
            let delay = jittered_delay(base, Duration::from_millis(5000), &mut rng);
            assert!(delay <= Duration::from_millis(6000));
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(WatchConfig::default().validate().is_ok());

        let zero_tick = WatchConfig {
            tick_millis: 0,
            ..WatchConfig::default()
        };
        assert!(zero_tick.validate().unwrap_err().contains("tick_millis"));

        let wide_jitter = WatchConfig {
            tick_millis: 100,
            jitter_millis: 100,
            ..WatchConfig::default()
        };
        assert!(wide_jitter.validate().unwrap_err().contains("jitter_millis"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_opening_triggers_exactly_one_notification() {
        let source = ScriptedSource::new(vec![Ok(snapshot(0, 0)), Ok(snapshot(3, 0))]);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut handle = start(source, notifier.clone(), WatchConfig::default());

        // seed, then three checks that all see 3 open seats
        let events = collect_snapshots(&mut handle, 4).await;
        let session = handle.stop().await.unwrap();

        assert_eq!(*notifier.calls.lock().unwrap(), vec![Opening::seats(3)]);
        assert_eq!(session.notifications_sent, 1);
        assert_eq!(session.last_snapshot, snapshot(3, 0));
        assert!(events
            .iter()
            .any(|e| matches!(e, WatchEvent::Notified(o) if o.count == 3)));
        assert!(events
            .iter()
            .any(|e| matches!(e, WatchEvent::Countdown(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_tick_policy_repeats_notifications() {
        let source = ScriptedSource::new(vec![Ok(snapshot(0, 0)), Ok(snapshot(1, 0))]);
        let notifier = Arc::new(RecordingNotifier::default());
        let config = WatchConfig {
            notify_policy: NotifyPolicy::EveryTick,
            ..WatchConfig::default()
        };
        let mut handle = start(source, notifier.clone(), config);

        collect_snapshots(&mut handle, 4).await;
        handle.stop().await.unwrap();

        assert_eq!(notifier.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_does_not_stop_loop() {
        let source = ScriptedSource::new(vec![
            Ok(snapshot(0, 0)),
            Err(FetchError::Network {
                message: "connection reset".to_string(),
            }),
            Ok(snapshot(2, 0)),
        ]);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut handle = start(source, notifier.clone(), WatchConfig::default());

        let events = collect_snapshots(&mut handle, 2).await;
        handle.stop().await.unwrap();

        assert!(events
            .iter()
            .any(|e| matches!(e, WatchEvent::FetchFailed(FetchError::Network { .. }))));
        assert_eq!(*notifier.calls.lock().unwrap(), vec![Opening::seats(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_check() {
        let source = ScriptedSource::new(vec![Ok(snapshot(0, 4))]);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut handle = start(source, notifier.clone(), WatchConfig::default());

        assert!(matches!(
            handle.next_event().await,
            Some(WatchEvent::Snapshot(_))
        ));
        let session = handle.stop().await.unwrap();

        assert_eq!(session.last_snapshot, snapshot(0, 4));
        assert!(notifier.calls.lock().unwrap().is_empty());
    }
}
