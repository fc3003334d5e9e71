// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic flush timer with per-tick jitter.
//!
//! Many clients flushing on the same fixed interval synchronize into
//! datagram bursts at the collector; re-randomizing the period on every
//! tick keeps a fleet's flush cycles spread out.

use std::time::Duration;

use tokio::time::Instant;

/// Timer whose period is re-jittered after every firing.
///
/// The next deadline is held in the struct, so the future returned by
/// [`tick`](JitteredTicker::tick) can be dropped and recreated (as
/// `select!` does on every loop iteration) without pushing the deadline
/// back.
pub struct JitteredTicker {
    interval: Duration,
    deadline: Instant,
}

impl JitteredTicker {
    pub fn new(interval: Duration) -> JitteredTicker {
        JitteredTicker {
            interval,
            deadline: Instant::now() + jitter(interval),
        }
    }

    /// Completes at the current deadline, then schedules the next one.
    pub async fn tick(&mut self) {
        tokio::time::sleep_until(self.deadline).await;
        self.deadline = Instant::now() + jitter(self.interval);
    }
}

/// A duration drawn uniformly from [interval/2, interval*3/2), never zero.
pub fn jitter(interval: Duration) -> Duration {
    let nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
    let jittered = (nanos / 2).saturating_add(fastrand::u64(..nanos.max(1)));
    Duration::from_nanos(jittered.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_half_interval() {
        let interval = Duration::from_secs(10);
        for _ in 0..1_000 {
            let j = jitter(interval);
            assert!(j >= interval / 2);
            assert!(j < interval + interval / 2);
        }
    }

    #[test]
    fn jitter_of_zero_interval_is_nonzero() {
        assert!(jitter(Duration::ZERO) > Duration::ZERO);
    }

    #[tokio::test]
    async fn ticker_fires_repeatedly() {
        let mut ticker = JitteredTicker::new(Duration::from_millis(40));
        let start = Instant::now();
        ticker.tick().await;
        ticker.tick().await;
        let elapsed = start.elapsed();
        // Two ticks, each jittered within [20ms, 60ms).
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_millis(500));
    }
}
