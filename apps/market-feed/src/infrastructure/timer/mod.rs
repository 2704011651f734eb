//! Scheduler Adapters
//!
//! - [`TokioScheduler`]: sleeps on the tokio runtime and posts due tasks
//!   back to the driver channel.
//! - [`VirtualScheduler`]: keeps tasks against a virtual clock that tests
//!   advance by hand.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ScheduledTask, Scheduler};

// =============================================================================
// Tokio Scheduler
// =============================================================================

/// Scheduler backed by `tokio::time::sleep`.
///
/// Each scheduled task gets its own sleeping task. When it wakes, the task
/// is converted into the driver's event type and sent on `tx`. Pending
/// sleeps are dropped when `cancel` fires.
#[derive(Debug)]
pub struct TokioScheduler<E> {
    tx: mpsc::Sender<E>,
    cancel: CancellationToken,
}

impl<E> TokioScheduler<E> {
    /// Create a scheduler posting into `tx`.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<E>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }
}

impl<E> Scheduler for TokioScheduler<E>
where
    E: From<ScheduledTask> + Send + 'static,
{
    fn schedule(&mut self, delay: Duration, task: ScheduledTask) {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if tx.send(E::from(task)).await.is_err() {
                        tracing::debug!(?task, "Driver gone before timer fired");
                    }
                }
            }
        });
    }
}

// =============================================================================
// Virtual Scheduler
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct PendingTask {
    due: Duration,
    seq: u64,
    task: ScheduledTask,
}

/// Scheduler driven by a virtual clock.
///
/// Nothing runs on its own: [`VirtualScheduler::advance`] moves the clock
/// and returns the tasks that became due, in due order (ties in scheduling
/// order). The caller hands them to the manager.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use market_feed::application::ports::{ScheduledTask, Scheduler};
/// use market_feed::infrastructure::timer::VirtualScheduler;
///
/// let mut scheduler = VirtualScheduler::new();
/// scheduler.schedule(Duration::from_secs(3), ScheduledTask::Reconnect);
///
/// assert!(scheduler.advance(Duration::from_millis(2999)).is_empty());
/// assert_eq!(scheduler.advance(Duration::from_millis(1)), vec![ScheduledTask::Reconnect]);
/// ```
#[derive(Debug, Default)]
pub struct VirtualScheduler {
    now: Duration,
    next_seq: u64,
    pending: Vec<PendingTask>,
    requested: Vec<Duration>,
}

impl VirtualScheduler {
    /// Create a scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Number of tasks not yet due.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Every delay ever requested, in request order.
    #[must_use]
    pub fn requested_delays(&self) -> &[Duration] {
        &self.requested
    }

    /// Time until the earliest pending task, if any.
    #[must_use]
    pub fn next_due_in(&self) -> Option<Duration> {
        self.pending
            .iter()
            .map(|p| p.due.saturating_sub(self.now))
            .min()
    }

    /// Move the clock forward by `by` and drain the tasks that became due.
    pub fn advance(&mut self, by: Duration) -> Vec<ScheduledTask> {
        self.now = self.now.saturating_add(by);

        let now = self.now;
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = pending;

        due.sort_by_key(|p| (p.due, p.seq));
        due.into_iter().map(|p| p.task).collect()
    }

    /// Jump straight to the earliest pending task and drain everything due
    /// at that instant.
    pub fn advance_to_next(&mut self) -> Vec<ScheduledTask> {
        self.next_due_in()
            .map_or_else(Vec::new, |delta| self.advance(delta))
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule(&mut self, delay: Duration, task: ScheduledTask) {
        self.requested.push(delay);
        self.pending.push(PendingTask {
            due: self.now.saturating_add(delay),
            seq: self.next_seq,
            task,
        });
        self.next_seq += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_fire_in_due_order() {
        let mut scheduler = VirtualScheduler::new();
        scheduler.schedule(Duration::from_secs(6), ScheduledTask::Reconnect);
        scheduler.schedule(Duration::from_secs(3), ScheduledTask::Reconnect);

        assert_eq!(scheduler.next_due_in(), Some(Duration::from_secs(3)));
        assert_eq!(scheduler.advance_to_next().len(), 1);
        assert_eq!(scheduler.now(), Duration::from_secs(3));
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.advance(Duration::from_secs(10)).len(), 1);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(
            scheduler.requested_delays(),
            [Duration::from_secs(6), Duration::from_secs(3)]
        );
    }

    #[test]
    fn advance_to_next_without_tasks_keeps_clock() {
        let mut scheduler = VirtualScheduler::new();
        assert!(scheduler.advance_to_next().is_empty());
        assert_eq!(scheduler.now(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_posts_after_delay() {
        let (tx, mut rx) = mpsc::channel::<ScheduledTask>(4);
        let mut scheduler = TokioScheduler::new(tx, CancellationToken::new());

        scheduler.schedule(Duration::from_secs(3), ScheduledTask::Reconnect);
        let start = tokio::time::Instant::now();

        assert_eq!(rx.recv().await, Some(ScheduledTask::Reconnect));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_stays_pending_until_due() {
        use tokio_test::{assert_pending, assert_ready};

        let (tx, mut rx) = mpsc::channel::<ScheduledTask>(4);
        let mut scheduler = TokioScheduler::new(tx, CancellationToken::new());
        scheduler.schedule(Duration::from_secs(3), ScheduledTask::Reconnect);
        tokio::task::yield_now().await;

        let mut recv = tokio_test::task::spawn(rx.recv());
        assert_pending!(recv.poll());

        tokio::time::advance(Duration::from_millis(2_999)).await;
        assert_pending!(recv.poll());

        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(assert_ready!(recv.poll()), Some(ScheduledTask::Reconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scheduler_drops_pending_tasks() {
        let (tx, mut rx) = mpsc::channel::<ScheduledTask>(4);
        let cancel = CancellationToken::new();
        let mut scheduler = TokioScheduler::new(tx, cancel.clone());

        scheduler.schedule(Duration::from_secs(3), ScheduledTask::Reconnect);
        cancel.cancel();
        drop(scheduler);

        assert_eq!(rx.recv().await, None);
    }
}
