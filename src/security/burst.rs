//! Sliding-window event density check per directory.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Directories with no event inside the window are dropped once the map
/// grows past this.
const PRUNE_AT: usize = 4096;

#[derive(Debug)]
pub struct BurstDetector {
    threshold: usize,
    window: Duration,
    windows: HashMap<PathBuf, VecDeque<Instant>>,
}

impl BurstDetector {
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold,
            window,
            windows: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record one event for `directory` and report whether the count inside
    /// the trailing window now exceeds the threshold.
    pub fn record_and_check(&mut self, directory: &Path, now: Instant) -> bool {
        let window = self.window;
        if self.windows.len() >= PRUNE_AT && !self.windows.contains_key(directory) {
            self.prune(now);
        }
        let stamps = self.windows.entry(directory.to_path_buf()).or_default();

        // Timestamps arrive in order under the engine lock, so expired ones sit at the front
        while stamps
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > window)
        {
            stamps.pop_front();
        }
        stamps.push_back(now);

        stamps.len() > self.threshold
    }

    /// Forget directories whose newest event has left the window.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|t| now.saturating_duration_since(*t) <= window)
        });
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Events currently inside the window for `directory`.
    pub fn count(&self, directory: &Path) -> usize {
        self.windows.get(directory).map_or(0, VecDeque::len)
    }
}
