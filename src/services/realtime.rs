use crate::client::FebosApi;
use crate::session::Session;
use crate::utils::to_json_line;
use log::{debug, error, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// What the loop does after a refresh attempt.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    Continue,
    Rediscover,
}

/// Counts consecutive failed refreshes.
#[derive(Debug, Default)]
struct FailureTracker {
    consecutive: u32,
    threshold: u32,
}

impl FailureTracker {
    fn new(threshold: u32) -> Self {
        FailureTracker {
            consecutive: 0,
            threshold,
        }
    }

    fn success(&mut self) {
        self.consecutive = 0;
    }

    fn failure(&mut self) -> Next {
        self.consecutive += 1;
        if self.threshold > 0 && self.consecutive >= self.threshold {
            self.consecutive = 0;
            Next::Rediscover
        } else {
            Next::Continue
        }
    }
}

/// Refresh forever at a steady cadence, printing each snapshot as a JSON line.
/// After `rediscover_after` consecutive failures the session logs in again and
/// rebuilds its input table.
pub fn run_loop<A: FebosApi>(session: &Session<A>, interval: Duration, rediscover_after: u32) -> Result<(), String> {
    let mut failures = FailureTracker::new(rediscover_after);
    loop {
        let tick_start = Instant::now();

        match session.refresh() {
            Ok(snapshot) => {
                failures.success();
                debug!("Refreshed {} value(s)", snapshot.values.len());
                println!("{}", to_json_line(&snapshot));
            }
            Err(e) => {
                error!("Refresh failed, values are stale: {}", e);
                if failures.failure() == Next::Rediscover {
                    warn!("{} consecutive refresh failures, rediscovering", rediscover_after);
                    match session.connect() {
                        Ok(count) => info!("Rediscovered {} input(s)", count),
                        Err(e) => error!("Rediscovery failed: {}", e),
                    }
                }
            }
        }

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rediscovers_after_threshold_and_resets() {
        let mut t = FailureTracker::new(3);
        assert_eq!(t.failure(), Next::Continue);
        assert_eq!(t.failure(), Next::Continue);
        assert_eq!(t.failure(), Next::Rediscover);
        assert_eq!(t.failure(), Next::Continue);
        t.success();
        assert_eq!(t.failure(), Next::Continue);
        assert_eq!(t.failure(), Next::Continue);
        assert_eq!(t.failure(), Next::Rediscover);
    }

    #[test]
    fn zero_threshold_never_rediscovers() {
        let mut t = FailureTracker::new(0);
        for _ in 0..10 {
            assert_eq!(t.failure(), Next::Continue);
        }
    }
}
