use std::time::{Duration, Instant};

use tracing::debug;

/// Pin the calling thread to core `index % cores`. Returns false if the OS refused.
pub fn pin_current_thread(index: usize) -> bool {
    let Some(cores) = core_affinity::get_core_ids() else {
        return false;
    };
    if cores.is_empty() {
        return false;
    }

    let core = cores[index % cores.len()];
    let pinned = core_affinity::set_for_current(core);
    if pinned {
        debug!(core = core.id, "Pinned thread");
    }
    pinned
}

/// Events-per-second over a sliding measurement window.
#[derive(Debug)]
pub struct RateMeter {
    window: Duration,
    window_start: Instant,
    count: u64,
    rate: f64,
}

impl RateMeter {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, now: Instant) -> Self {
        Self {
            window,
            window_start: now,
            count: 0,
            rate: 0.0,
        }
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Count one event; closes the window and updates the rate once it has elapsed.
    pub fn tick_at(&mut self, now: Instant) {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.window {
            self.rate = self.count as f64 / elapsed.as_secs_f64();
            self.count = 0;
            self.window_start = now;
        }
    }

    /// Rate measured over the last completed window.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}
