//! Per-path rate limiter absorbing notification storms.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Entries older than the interval are dropped once the map grows past this.
const PRUNE_AT: usize = 4096;

/// Admits a path at most once per `min_interval`.
///
/// A single logical write often arrives as several OS notifications; every
/// repeat inside the interval is dropped without being logged or alerted.
#[derive(Debug)]
pub struct ThrottleGate {
    min_interval: Duration,
    last_accepted: HashMap<PathBuf, Instant>,
}

impl ThrottleGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: HashMap::new(),
        }
    }

    /// Returns true and records `now` if the path is outside its interval.
    pub fn admit(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(last) = self.last_accepted.get(path)
            && now.saturating_duration_since(*last) < self.min_interval
        {
            debug!("Throttled event for {}", path.display());
            return false;
        }

        if self.last_accepted.len() >= PRUNE_AT {
            self.prune(now);
        }
        self.last_accepted.insert(path.to_path_buf(), now);
        true
    }

    /// Forget paths whose interval has already elapsed.
    pub fn prune(&mut self, now: Instant) {
        let min_interval = self.min_interval;
        self.last_accepted
            .retain(|_, last| now.saturating_duration_since(*last) < min_interval);
    }

    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_inside_interval_are_dropped() {
        let mut gate = ThrottleGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        let path = Path::new("/srv/skills/SKILL.md");

        assert!(gate.admit(path, t0));
        assert!(!gate.admit(path, t0 + Duration::from_secs(1)));
        assert!(!gate.admit(path, t0 + Duration::from_millis(4999)));
    }

    #[test]
    fn admits_again_after_interval() {
        let mut gate = ThrottleGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        let path = Path::new("/srv/skills/SKILL.md");

        assert!(gate.admit(path, t0));
        assert!(gate.admit(path, t0 + Duration::from_secs(6)));
        // The rejected-in-between attempt must not have moved the window
        assert!(!gate.admit(path, t0 + Duration::from_secs(7)));
        assert!(gate.admit(path, t0 + Duration::from_secs(11)));
    }

    #[test]
    fn paths_are_independent() {
        let mut gate = ThrottleGate::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert!(gate.admit(Path::new("/srv/a.md"), t0));
        assert!(gate.admit(Path::new("/srv/b.md"), t0));
        assert_eq!(gate.tracked(), 2);
    }

    #[test]
    fn zero_interval_admits_everything() {
        let mut gate = ThrottleGate::new(Duration::ZERO);
        let t0 = Instant::now();
        let path = Path::new("/srv/a.md");

        assert!(gate.admit(path, t0));
        assert!(gate.admit(path, t0));
    }

    #[test]
    fn prune_drops_expired_paths() {
        let mut gate = ThrottleGate::new(Duration::from_secs(1));
        let t0 = Instant::now();
        gate.admit(Path::new("/srv/a.md"), t0);
        gate.admit(Path::new("/srv/b.md"), t0 + Duration::from_secs(2));

        gate.prune(t0 + Duration::from_millis(2500));
        assert_eq!(gate.tracked(), 1);
    }
}
