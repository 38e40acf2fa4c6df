//! Per-peer bounded traffic history, suitable for charting.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// The longest traffic history kept per peer.
pub const MAX_SAMPLES: usize = 20;

/// One traffic observation.
#[derive(Debug, Clone, Copy)]
pub struct TrafficSample {
    /// When this sample was taken.
    pub at: DateTime<Utc>,
    /// Cumulative bytes received at this instant.
    pub rx_total: u64,
    /// Cumulative bytes sent at this instant.
    pub tx_total: u64,
    /// Receive rate since the previous sample, in bytes/second.
    pub rx_rate: f64,
    /// Send rate since the previous sample, in bytes/second.
    pub tx_rate: f64,
}

/// A bounded ring of a peer's most recent traffic samples.
#[derive(Debug, Clone, Default)]
pub struct TrafficRing {
    samples: VecDeque<TrafficSample>,
}

impl TrafficRing {
    /// Builds an empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new cumulative `(rx_total, tx_total)` reading, computing the
    /// rate against the previous sample. The first sample always yields a
    /// zero rate. Rates are clamped to zero: a counter reset or rollover
    /// never yields a negative rate.
    pub fn push(&mut self, at: DateTime<Utc>, rx_total: u64, tx_total: u64) -> TrafficSample {
        let (rx_rate, tx_rate) = match self.samples.back() {
            Some(prev) => {
                let elapsed = (at - prev.at).num_milliseconds() as f64 / 1000.0;
                if elapsed > 0.0 {
                    let rx_diff = rx_total as f64 - prev.rx_total as f64;
                    let tx_diff = tx_total as f64 - prev.tx_total as f64;
                    ((rx_diff / elapsed).max(0.0), (tx_diff / elapsed).max(0.0))
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };

        let sample = TrafficSample {
            at,
            rx_total,
            tx_total,
            rx_rate,
            tx_rate,
        };

        self.samples.push_back(sample);
        if self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }

        sample
    }

    /// The samples currently retained, oldest first.
    #[must_use]
    pub fn samples(&self) -> &VecDeque<TrafficSample> {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn first_sample_has_zero_rate() {
        let mut ring = TrafficRing::new();
        let sample = ring.push(Utc::now(), 1000, 500);
        assert_eq!(sample.rx_rate, 0.0);
        assert_eq!(sample.tx_rate, 0.0);
    }

    #[test]
    fn rate_is_computed_against_previous_sample() {
        let mut ring = TrafficRing::new();
        let t0 = Utc::now();
        ring.push(t0, 1000, 500);
        let sample = ring.push(t0 + Duration::seconds(2), 3000, 900);
        assert!((sample.rx_rate - 1000.0).abs() < 0.001);
        assert!((sample.tx_rate - 200.0).abs() < 0.001);
    }

    #[test]
    fn counter_reset_clamps_rate_to_zero() {
        let mut ring = TrafficRing::new();
        let t0 = Utc::now();
        ring.push(t0, 5000, 5000);
        let sample = ring.push(t0 + Duration::seconds(1), 100, 100);
        assert_eq!(sample.rx_rate, 0.0);
        assert_eq!(sample.tx_rate, 0.0);
    }

    #[test]
    fn ring_caps_at_max_samples() {
        let mut ring = TrafficRing::new();
        let t0 = Utc::now();
        for i in 0..30 {
            ring.push(t0 + Duration::seconds(i), i as u64 * 10, i as u64 * 5);
        }
        assert_eq!(ring.samples().len(), MAX_SAMPLES);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rates_are_never_negative_over_monotonic_counters(
                deltas in prop::collection::vec((1i64..=3600, 0u64..=1_000_000, 0u64..=1_000_000), 1..40),
            ) {
                let mut ring = TrafficRing::new();
                let mut at = Utc::now();
                let mut rx_total = 0u64;
                let mut tx_total = 0u64;

                for (elapsed_secs, rx_delta, tx_delta) in deltas {
                    at += Duration::seconds(elapsed_secs);
                    rx_total += rx_delta;
                    tx_total += tx_delta;
                    let sample = ring.push(at, rx_total, tx_total);
                    prop_assert!(sample.rx_rate >= 0.0);
                    prop_assert!(sample.tx_rate >= 0.0);
                }

                prop_assert!(ring.samples().len() <= MAX_SAMPLES);
            }

            #[test]
            fn counter_rollback_always_clamps_to_zero(
                first_rx in 0u64..=1_000_000,
                first_tx in 0u64..=1_000_000,
                second_rx in 0u64..=1_000_000,
                second_tx in 0u64..=1_000_000,
                elapsed_secs in 1i64..=3600,
            ) {
                let mut ring = TrafficRing::new();
                let t0 = Utc::now();
                ring.push(t0, first_rx, first_tx);
                let sample = ring.push(t0 + Duration::seconds(elapsed_secs), second_rx, second_tx);

                if second_rx < first_rx {
                    prop_assert_eq!(sample.rx_rate, 0.0);
                }
                if second_tx < first_tx {
                    prop_assert_eq!(sample.tx_rate, 0.0);
                }
            }
        }
    }
}
