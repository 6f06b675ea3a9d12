// src/timer.rs

//! Challenge countdown.
//!
//! Cosmetic only: reaching zero does not block or cancel grading.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u64,
}

impl Countdown {
    pub fn new(seconds: u64) -> Self {
        Self { remaining: seconds }
    }

    /// One second elapsed. Never goes below zero.
    pub fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    /// `MM:SS`; minutes keep growing past 99.
    pub fn format(&self) -> String {
        format_clock(self.remaining)
    }

    /// Tick every `interval` on the tokio runtime until zero.
    ///
    /// The returned handle receives each new value; dropping it stops the
    /// task.
    pub fn spawn(self, interval: Duration) -> CountdownHandle {
        let (tx, rx) = watch::channel(self.remaining);
        let mut countdown = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;

            while !countdown.is_expired() {
                ticker.tick().await;
                countdown.tick();
                if tx.send(countdown.remaining()).is_err() {
                    break;
                }
            }
        });

        CountdownHandle { rx, task }
    }
}

pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub struct CountdownHandle {
    rx: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl CountdownHandle {
    /// Seconds remaining as last published.
    pub fn remaining(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Wait for the next tick. `None` once the countdown has finished.
    pub async fn changed(&mut self) -> Option<u64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_saturates_at_zero() {
        let mut c = Countdown::new(1);
        c.tick();
        assert!(c.is_expired());
        c.tick();
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(Countdown::new(0).format(), "00:00");
        assert_eq!(Countdown::new(65).format(), "01:05");
        assert_eq!(Countdown::new(1800).format(), "30:00");
        assert_eq!(format_clock(6000), "100:00");
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_countdown_publishes_each_second_then_stops() {
        let mut handle = Countdown::new(3).spawn(Duration::from_secs(1));
        assert_eq!(handle.remaining(), 3);

        assert_eq!(handle.changed().await, Some(2));
        assert_eq!(handle.changed().await, Some(1));
        assert_eq!(handle.changed().await, Some(0));
        assert_eq!(handle.changed().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_length_countdown_finishes_immediately() {
        let mut handle = Countdown::new(0).spawn(Duration::from_secs(1));
        assert_eq!(handle.changed().await, None);
        assert_eq!(handle.remaining(), 0);
    }
}
