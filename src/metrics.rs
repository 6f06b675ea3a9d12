// src/metrics.rs

//! Timing and memory measurement for sandbox children.
//!
//! Memory tracking uses `sysinfo` and is best-effort:
//! - Memory is sampled periodically (polling).
//! - Extremely short-lived spikes may not be captured.
//! - If the PID cannot be inspected, tracking returns `None`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, System};

/// Metrics collected for a single sandbox invocation.
#[derive(Debug, Clone)]
pub struct InvocationMetrics {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u128,

    /// Peak RSS memory in KB (best-effort).
    pub max_rss_kb: Option<u64>,
}

/// Tracks peak memory usage of a child process while it runs.
pub struct MemoryTracker {
    stop: Arc<AtomicBool>,
    max_kb: Arc<Mutex<u64>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MemoryTracker {
    /// Start sampling `pid_u32` every `sample_every` until stopped or the
    /// process disappears.
    pub fn start(pid_u32: u32, sample_every: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let max_kb = Arc::new(Mutex::new(0u64));

        let stop_clone = Arc::clone(&stop);
        let max_clone = Arc::clone(&max_kb);

        let handle = thread::spawn(move || {
            let pid = Pid::from_u32(pid_u32);
            let mut system = System::new();

            loop {
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }

                system.refresh_process(pid);

                if let Some(process) = system.process(pid) {
                    // sysinfo reports bytes
                    let mem_kb = process.memory() / 1024;

                    if let Ok(mut guard) = max_clone.lock() {
                        if mem_kb > *guard {
                            *guard = mem_kb;
                        }
                    }
                } else {
                    break;
                }

                thread::sleep(sample_every);
            }
        });

        Self {
            stop,
            max_kb,
            handle: Some(handle),
        }
    }

    /// Stop tracking and return the peak RSS in KB.
    ///
    /// Returns `None` if no samples were collected.
    pub fn stop_and_take(mut self) -> Option<u64> {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        let max = match self.max_kb.lock() {
            Ok(guard) => *guard,
            Err(_) => 0,
        };

        if max > 0 {
            Some(max)
        } else {
            None
        }
    }
}
