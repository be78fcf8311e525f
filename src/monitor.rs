use std::collections::VecDeque;
use std::str::FromStr;

use crate::{
    env::Error,
    units::{Bytes, BYTES_PER_PACKET},
};

/// One finalized measurement interval: an immutable snapshot of everything the
/// sender accounted between two `record_run` calls. All derived metrics are
/// computed lazily from the snapshot.
///
/// Times are in seconds, rates in bits per second.
#[derive(Debug, Clone, PartialEq, typed_builder::TypedBuilder)]
pub struct MonitorInterval {
    pub bytes_sent: Bytes,
    pub bytes_acked: Bytes,
    pub bytes_lost: Bytes,
    pub send_start: f64,
    pub send_end: f64,
    pub recv_start: f64,
    pub recv_end: f64,
    /// RTT samples in arrival order. May hold a single inherited sample when
    /// the interval itself saw no ACK.
    pub rtt_samples: Vec<f64>,
    pub queue_delay_samples: Vec<f64>,
    pub packet_size: Bytes,
    /// Connection-wide minimum latency observed up to finalization.
    #[builder(default)]
    pub conn_min_latency: Option<f64>,
}

impl MonitorInterval {
    /// The all-zero interval used to pad a fresh history.
    pub fn empty() -> Self {
        Self::builder()
            .bytes_sent(Bytes::ZERO)
            .bytes_acked(Bytes::ZERO)
            .bytes_lost(Bytes::ZERO)
            .send_start(0.0)
            .send_end(0.0)
            .recv_start(0.0)
            .recv_end(0.0)
            .rtt_samples(Vec::new())
            .queue_delay_samples(Vec::new())
            .packet_size(BYTES_PER_PACKET)
            .build()
    }

    pub fn send_dur(&self) -> f64 {
        self.send_end - self.send_start
    }

    pub fn recv_dur(&self) -> f64 {
        self.recv_end - self.recv_start
    }

    /// Sending rate over the interval, bits/sec.
    pub fn send_rate(&self) -> f64 {
        let dur = self.send_dur();
        if dur > 0.0 {
            self.bytes_sent.into_bits() as f64 / dur
        } else {
            0.0
        }
    }

    /// Delivery rate over the receive window, bits/sec.
    pub fn recv_rate(&self) -> f64 {
        let dur = self.recv_dur();
        if dur > 0.0 {
            self.bytes_acked.into_bits() as f64 / dur
        } else {
            0.0
        }
    }

    pub fn avg_latency(&self) -> f64 {
        mean(&self.rtt_samples)
    }

    pub fn avg_queue_delay(&self) -> f64 {
        mean(&self.queue_delay_samples)
    }

    /// Fraction of delivered-or-lost bytes that were lost.
    pub fn loss_ratio(&self) -> f64 {
        let denom = self.bytes_lost + self.bytes_acked;
        if denom > Bytes::ZERO {
            self.bytes_lost.into_f64() / denom.into_f64()
        } else {
            0.0
        }
    }

    /// Latency slope across the interval, normalized by the send duration.
    pub fn sent_latency_inflation(&self) -> f64 {
        let dur = self.send_dur();
        match (self.rtt_samples.first(), self.rtt_samples.last()) {
            (Some(first), Some(last)) if dur > 0.0 => (last - first) / dur,
            _ => 0.0,
        }
    }

    /// Average latency relative to the connection's minimum.
    pub fn latency_ratio(&self) -> f64 {
        match self.conn_min_latency {
            Some(min) if min > 0.0 => self.avg_latency() / min,
            _ => 1.0,
        }
    }

    pub fn latency_increase(&self) -> f64 {
        match (self.rtt_samples.first(), self.rtt_samples.last()) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        }
    }

    pub fn send_ratio(&self) -> f64 {
        let recv = self.recv_rate();
        if recv > 0.0 {
            self.send_rate() / recv
        } else {
            1.0
        }
    }

    pub fn recv_ratio(&self) -> f64 {
        let send = self.send_rate();
        if send > 0.0 {
            self.recv_rate() / send
        } else {
            1.0
        }
    }

    pub fn feature(&self, feature: Feature) -> f64 {
        match feature {
            Feature::SendRate => self.send_rate(),
            Feature::RecvRate => self.recv_rate(),
            Feature::AvgLatency => self.avg_latency(),
            Feature::LossRatio => self.loss_ratio(),
            Feature::SentLatencyInflation => self.sent_latency_inflation(),
            Feature::LatencyRatio => self.latency_ratio(),
            Feature::LatencyIncrease => self.latency_increase(),
            Feature::SendRatio => self.send_ratio(),
            Feature::RecvRatio => self.recv_ratio(),
        }
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// One scalar of the observation vector, derived per monitor interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    SendRate,
    RecvRate,
    AvgLatency,
    LossRatio,
    SentLatencyInflation,
    LatencyRatio,
    LatencyIncrease,
    SendRatio,
    RecvRatio,
}

impl Feature {
    /// The scale-free subset used as the default observation.
    pub fn default_set() -> Vec<Feature> {
        vec![
            Feature::SentLatencyInflation,
            Feature::LatencyRatio,
            Feature::RecvRatio,
        ]
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "send rate" => Ok(Feature::SendRate),
            "recv rate" => Ok(Feature::RecvRate),
            "avg latency" => Ok(Feature::AvgLatency),
            "loss ratio" => Ok(Feature::LossRatio),
            "sent latency inflation" => Ok(Feature::SentLatencyInflation),
            "latency ratio" => Ok(Feature::LatencyRatio),
            "latency increase" => Ok(Feature::LatencyIncrease),
            "send ratio" => Ok(Feature::SendRatio),
            "recv ratio" => Ok(Feature::RecvRatio),
            other => Err(Error::UnknownFeature(other.to_string())),
        }
    }
}

/// Bounded ring of the most recent monitor intervals, oldest first.
///
/// A fresh history is pre-filled with empty intervals so the observation
/// vector always has `history_len` entries; real intervals evict the padding
/// from the front.
#[derive(Debug, Clone)]
pub struct History {
    inner: VecDeque<MonitorInterval>,
}

impl History {
    pub fn new(history_len: usize) -> Self {
        assert!(history_len > 0, "history length must be positive");
        Self {
            inner: (0..history_len).map(|_| MonitorInterval::empty()).collect(),
        }
    }

    /// Appends a finalized interval, evicting the oldest.
    pub fn step(&mut self, mi: MonitorInterval) {
        self.inner.pop_front();
        self.inner.push_back(mi);
    }

    /// The most recently finalized interval.
    pub fn back(&self) -> &MonitorInterval {
        self.inner.back().expect("history is never empty")
    }

    /// Flattens the retained intervals' feature values in chronological order.
    pub fn as_array(&self, features: &[Feature]) -> Vec<f64> {
        self.inner
            .iter()
            .flat_map(|mi| features.iter().map(|&f| mi.feature(f)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mi() -> MonitorInterval {
        MonitorInterval::builder()
            .bytes_sent(Bytes::new(15_000))
            .bytes_acked(Bytes::new(12_000))
            .bytes_lost(Bytes::new(3_000))
            .send_start(0.0)
            .send_end(1.0)
            .recv_start(0.0)
            .recv_end(1.0)
            .rtt_samples(vec![0.04, 0.05, 0.06])
            .queue_delay_samples(vec![0.0, 0.01])
            .packet_size(BYTES_PER_PACKET)
            .conn_min_latency(Some(0.04))
            .build()
    }

    #[test]
    fn byte_invariants_hold() {
        let mi = sample_mi();
        assert!(mi.bytes_acked <= mi.bytes_sent);
        assert!(mi.bytes_lost + mi.bytes_acked <= mi.bytes_sent);
    }

    #[test]
    fn rates_in_bits_per_sec() {
        let mi = sample_mi();
        assert_eq!(mi.send_rate(), 120_000.0);
        assert_eq!(mi.recv_rate(), 96_000.0);
    }

    #[test]
    fn loss_ratio_over_delivered_and_lost() {
        let mi = sample_mi();
        assert!((mi.loss_ratio() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn latency_metrics() {
        let mi = sample_mi();
        assert!((mi.avg_latency() - 0.05).abs() < 1e-12);
        assert!((mi.sent_latency_inflation() - 0.02).abs() < 1e-12);
        assert!((mi.latency_ratio() - 1.25).abs() < 1e-12);
        assert!((mi.latency_increase() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn empty_interval_is_neutral() {
        let mi = MonitorInterval::empty();
        assert_eq!(mi.send_rate(), 0.0);
        assert_eq!(mi.recv_rate(), 0.0);
        assert_eq!(mi.loss_ratio(), 0.0);
        assert_eq!(mi.latency_ratio(), 1.0);
        assert_eq!(mi.send_ratio(), 1.0);
    }

    #[test]
    fn feature_parsing() {
        assert_eq!(
            "sent latency inflation".parse::<Feature>().unwrap(),
            Feature::SentLatencyInflation
        );
        assert!(matches!(
            "warp factor".parse::<Feature>(),
            Err(Error::UnknownFeature(_))
        ));
    }

    #[test]
    fn history_ring_evicts_oldest() {
        let mut history = History::new(2);
        let mi = sample_mi();
        history.step(mi.clone());
        assert_eq!(history.back(), &mi);
        let features = [Feature::LossRatio];
        let arr = history.as_array(&features);
        // Chronological order: padding first, newest last.
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0], 0.0);
        assert!((arr[1] - 0.2).abs() < 1e-12);

        history.step(MonitorInterval::empty());
        history.step(MonitorInterval::empty());
        assert_eq!(history.as_array(&features), vec![0.0, 0.0]);
    }

    #[test]
    fn fresh_history_is_padding_only() {
        let history = History::new(3);
        let arr = history.as_array(&Feature::default_set());
        assert_eq!(arr.len(), 9);
    }
}
