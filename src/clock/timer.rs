use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};

/// Fixed-rate deadline that can be re-armed with a new interval or cancelled.
///
/// The owner polls it from its own event loop; nothing runs in the background.
#[derive(Debug, Clone, Default)]
pub struct RepeatingTask {
    interval: Duration,
    next: Option<Instant>,
}

impl RepeatingTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the task; the first firing is one interval after `now`.
    pub fn arm(&mut self, now: Instant, interval: Duration) {
        self.interval = interval.max(Duration::from_micros(100));
        self.next = now.checked_add(self.interval);
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Returns true when a deadline has passed and schedules the following one.
    /// Missed periods are skipped rather than replayed in a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(deadline) = self.next else {
            return false;
        };
        if now < deadline {
            return false;
        }
        // An interval past the end of the clock leaves the task disarmed.
        self.next = deadline
            .checked_add(self.interval)
            .and_then(|next| if next <= now { now.checked_add(self.interval) } else { Some(next) });
        true
    }
}

/// Owning side of a cancellation pair. Dropping it cancels as well.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Option<Sender<()>>,
}

/// Observing side, handed to the thread doing the scheduled work.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = bounded::<()>(1);
    (CancelHandle { tx: Some(tx) }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&mut self) {
        self.tx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_none()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Ok(()) | Err(TryRecvError::Disconnected))
    }

    /// Sleep for `dur` unless cancelled first. Returns true if cancelled.
    pub fn sleep(&self, dur: Duration) -> bool {
        match self.rx.recv_timeout(dur) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Sleep until `deadline` unless cancelled first. Returns true if cancelled.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if deadline <= now {
            return self.is_cancelled();
        }
        self.sleep(deadline - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_task_never_fires() {
        let mut task = RepeatingTask::new();
        assert!(!task.poll(Instant::now() + Duration::from_secs(10)));
        assert!(task.next_deadline().is_none());
    }

    #[test]
    fn fires_once_per_interval() {
        let t0 = Instant::now();
        let mut task = RepeatingTask::new();
        task.arm(t0, Duration::from_millis(100));
        assert!(!task.poll(t0 + Duration::from_millis(50)));
        assert!(task.poll(t0 + Duration::from_millis(100)));
        assert!(!task.poll(t0 + Duration::from_millis(150)));
        assert!(task.poll(t0 + Duration::from_millis(200)));
        assert_eq!(task.next_deadline(), Some(t0 + Duration::from_millis(300)));
    }

    #[test]
    fn overrun_skips_missed_periods() {
        let t0 = Instant::now();
        let mut task = RepeatingTask::new();
        task.arm(t0, Duration::from_millis(100));
        let late = t0 + Duration::from_millis(550);
        assert!(task.poll(late));
        assert!(!task.poll(late));
        assert_eq!(task.next_deadline(), Some(late + Duration::from_millis(100)));
    }

    #[test]
    fn rearm_and_cancel() {
        let t0 = Instant::now();
        let mut task = RepeatingTask::new();
        task.arm(t0, Duration::from_millis(100));
        task.arm(t0, Duration::from_millis(50));
        assert_eq!(task.interval(), Duration::from_millis(50));
        assert!(task.poll(t0 + Duration::from_millis(50)));
        task.cancel();
        assert!(!task.is_armed());
        assert!(!task.poll(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn interval_past_the_clock_leaves_task_disarmed() {
        let t0 = Instant::now();
        let mut task = RepeatingTask::new();
        task.arm(t0, Duration::MAX);
        assert!(!task.is_armed());
        assert!(!task.poll(t0 + Duration::from_secs(3600)));
    }

    #[test]
    fn token_observes_cancel_and_drop() {
        let (mut handle, token) = cancel_pair();
        assert!(!token.is_cancelled());
        assert!(!token.sleep(Duration::from_millis(1)));
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(token.is_cancelled());
        assert!(token.sleep(Duration::from_secs(5)));

        let (handle, token) = cancel_pair();
        drop(handle);
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_wakes_a_sleeping_thread() {
        let (mut handle, token) = cancel_pair();
        let started = Instant::now();
        let worker = std::thread::spawn(move || token.sleep(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(20));
        handle.cancel();
        assert!(worker.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
