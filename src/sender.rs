use std::cmp::Ordering;
use std::str::FromStr;

use crate::{
    env::Error,
    monitor::{History, MonitorInterval},
    time::Time,
    units::{Bytes, BYTES_PER_PACKET},
};

/// Sending rate bounds in packets per second.
pub const MIN_RATE: f64 = 5.0;
pub const MAX_RATE: f64 = 1000.0;

/// Floor for the retransmission timeout in seconds.
const MIN_RTO: f64 = 0.2;

/// The congestion-control algorithm driving a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcKind {
    /// Rate-based control: pacing at `1/rate`, no window gating, no RTO.
    Aurora,
    /// Window-based control: sends gated by cwnd, RTO-driven timeouts.
    Cubic,
}

impl FromStr for CcKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "aurora" => Ok(CcKind::Aurora),
            "cubic" => Ok(CcKind::Cubic),
            other => Err(Error::UnsupportedCc(other.to_string())),
        }
    }
}

/// How the sender decides it may emit a packet, and how actions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendingPolicy {
    RateControlled,
    WindowControlled,
}

impl From<CcKind> for SendingPolicy {
    fn from(kind: CcKind) -> Self {
        match kind {
            CcKind::Aurora => SendingPolicy::RateControlled,
            CcKind::Cubic => SendingPolicy::WindowControlled,
        }
    }
}

/// Per-flow congestion-control state.
///
/// The sender applies externally supplied rate/window deltas and accounts for
/// packet outcomes; it never decides the adjustment itself. The engine owns
/// all mutation ordering.
#[derive(Debug)]
pub(crate) struct Sender {
    policy: SendingPolicy,
    delta_scale: f64,

    /// Sending rate in packets per second; doubles as the pacing clock.
    pub(crate) rate: f64,
    /// Congestion window in packets (window mode only).
    pub(crate) cwnd: u64,

    pub(crate) sent: u64,
    pub(crate) acked: u64,
    pub(crate) lost: u64,
    pub(crate) timeouts: u64,
    bytes_in_flight: Bytes,

    /// RTT samples of the current interval, with their arrival times (secs).
    rtt_samples: Vec<f64>,
    rtt_samples_ts: Vec<f64>,
    /// Kept as a fallback for intervals that end with zero ACKs.
    prev_rtt_samples: Vec<f64>,
    pub(crate) queue_delay_samples: Vec<f64>,
    obs_start_time: f64,

    min_latency: Option<f64>,
    pub(crate) min_rtt: f64,
    /// Smoothed RTT estimate and variance, EWMA with alpha = 7/8.
    pub(crate) est_rtt: f64,
    pub(crate) rtt_var: f64,
    /// Retransmission timeout; `None` disables timeout detection.
    pub(crate) rto: Option<f64>,
    /// Loss-dedup counter: while positive, timeouts are suppressed. Counts
    /// packets that were in flight when the last timeout fired.
    pub(crate) pkt_loss_wait: u64,

    pub(crate) got_data: bool,
    /// True until the first interval whose latency moved either way.
    pub(crate) start_stage: bool,
    pub(crate) lat_diff: f64,
    pub(crate) latest_rtt: f64,
    pub(crate) avg_latency: f64,
    pub(crate) send_rate: f64,
    pub(crate) recv_rate: f64,
    /// Max of the recent receive-rate cache, bits/sec.
    pub(crate) max_tput: f64,

    pub(crate) history: History,
}

impl Sender {
    pub(crate) fn new(
        rate: f64,
        policy: SendingPolicy,
        delta_scale: f64,
        history_len: usize,
    ) -> Self {
        Self {
            policy,
            delta_scale,
            rate,
            cwnd: 25,
            sent: 0,
            acked: 0,
            lost: 0,
            timeouts: 0,
            bytes_in_flight: Bytes::ZERO,
            rtt_samples: Vec::new(),
            rtt_samples_ts: Vec::new(),
            prev_rtt_samples: Vec::new(),
            queue_delay_samples: Vec::new(),
            obs_start_time: 0.0,
            min_latency: None,
            min_rtt: 10.0,
            est_rtt: 1.0,
            rtt_var: 0.5,
            rto: None,
            pkt_loss_wait: 0,
            got_data: false,
            start_stage: true,
            lat_diff: 0.0,
            latest_rtt: 0.0,
            avg_latency: 0.0,
            send_rate: 0.0,
            recv_rate: 0.0,
            max_tput: 0.0,
            history: History::new(history_len),
        }
    }

    /// Multiplicative rate update: `rate * (1 + d)` upward, `rate / (1 - d)`
    /// downward, clamped to `[MIN_RATE, MAX_RATE]`.
    pub(crate) fn apply_rate_delta(&mut self, delta: f64) {
        let delta = delta * self.delta_scale;
        if delta >= 0.0 {
            self.set_rate(self.rate * (1.0 + delta));
        } else {
            self.set_rate(self.rate / (1.0 - delta));
        }
    }

    pub(crate) fn apply_cwnd_delta(&mut self, delta: f64) {
        let delta = delta * self.delta_scale;
        let new = if delta >= 0.0 {
            self.cwnd as f64 * (1.0 + delta)
        } else {
            self.cwnd as f64 / (1.0 - delta)
        };
        self.cwnd = (new.floor() as u64).max(1);
    }

    fn set_rate(&mut self, new_rate: f64) {
        self.rate = new_rate.clamp(MIN_RATE, MAX_RATE);
    }

    pub(crate) fn can_send_packet(&self) -> bool {
        match self.policy {
            SendingPolicy::RateControlled => true,
            SendingPolicy::WindowControlled => {
                self.bytes_in_flight.into_u64() / BYTES_PER_PACKET.into_u64() < self.cwnd
            }
        }
    }

    pub(crate) fn on_packet_sent(&mut self) {
        self.sent += 1;
        self.bytes_in_flight += BYTES_PER_PACKET;
    }

    pub(crate) fn on_packet_acked(&mut self, rtt: f64, now: Time) {
        self.min_rtt = self.min_rtt.min(rtt);
        self.est_rtt = (7.0 * self.est_rtt + rtt) / 8.0;
        self.rtt_var = (7.0 * self.rtt_var + (rtt - self.est_rtt).abs()) / 8.0;
        if self.policy == SendingPolicy::WindowControlled {
            self.rto = Some((self.est_rtt + 4.0 * self.rtt_var).max(MIN_RTO));
        }

        self.acked += 1;
        self.rtt_samples.push(rtt);
        self.rtt_samples_ts.push(now.as_secs_f64());
        if self.min_latency.map_or(true, |min| rtt < min) {
            self.min_latency = Some(rtt);
        }
        self.release_in_flight();
        if !self.got_data {
            self.got_data = !self.rtt_samples.is_empty();
        }
        self.pkt_loss_wait = self.pkt_loss_wait.saturating_sub(1);
    }

    pub(crate) fn on_packet_lost(&mut self, _rtt: f64) {
        self.lost += 1;
        self.release_in_flight();
        self.pkt_loss_wait = self.pkt_loss_wait.saturating_sub(1);
    }

    /// Reaction to an RTO-class loss. The base contract only records the
    /// event and releases the packet; the backoff itself is policy-owned.
    pub(crate) fn timeout(&mut self) {
        self.timeouts += 1;
        self.release_in_flight();
        if self.policy == SendingPolicy::WindowControlled {
            self.cwnd = (self.cwnd / 2).max(1);
            // Ignore further timeouts until the outstanding window drains.
            self.pkt_loss_wait = self.packets_in_flight();
        }
    }

    fn release_in_flight(&mut self) {
        assert!(
            self.bytes_in_flight >= BYTES_PER_PACKET,
            "bytes in flight underflow"
        );
        self.bytes_in_flight -= BYTES_PER_PACKET;
    }

    pub(crate) fn packets_in_flight(&self) -> u64 {
        self.bytes_in_flight.into_u64() / BYTES_PER_PACKET.into_u64()
    }

    /// Finalizes the current accounting window into a `MonitorInterval` and
    /// appends it to the history.
    pub(crate) fn record_run(&mut self, now: Time) {
        let mi = self.finalize_interval(now);
        self.history.step(mi);
    }

    fn finalize_interval(&mut self, now: Time) -> MonitorInterval {
        let obs_end = now.as_secs_f64();
        // An interval with zero ACKs inherits the previous interval's mean so
        // downstream latency math never sees an empty sample set.
        let rtt_samples = if self.rtt_samples.is_empty() && !self.prev_rtt_samples.is_empty() {
            let mean =
                self.prev_rtt_samples.iter().sum::<f64>() / self.prev_rtt_samples.len() as f64;
            vec![mean]
        } else {
            self.rtt_samples.clone()
        };
        let have_acks = !self.rtt_samples.is_empty();
        let mut recv_start = if have_acks {
            self.history.back().recv_end
        } else {
            self.obs_start_time
        };
        let recv_end = if have_acks {
            *self.rtt_samples_ts.last().expect("have_acks")
        } else {
            obs_end
        };
        let mut bytes_acked = BYTES_PER_PACKET.scale_by(self.acked as f64);
        if recv_start == 0.0 && have_acks {
            // The episode's first receive window opens at the first ACK, which
            // itself carries no measurable delivery interval.
            recv_start = self.rtt_samples_ts[0];
            bytes_acked = BYTES_PER_PACKET.scale_by(self.acked.saturating_sub(1) as f64);
        }
        MonitorInterval::builder()
            .bytes_sent(BYTES_PER_PACKET.scale_by(self.sent as f64))
            .bytes_acked(bytes_acked)
            .bytes_lost(BYTES_PER_PACKET.scale_by(self.lost as f64))
            .send_start(self.obs_start_time)
            .send_end(obs_end)
            .recv_start(recv_start)
            .recv_end(recv_end)
            .rtt_samples(rtt_samples)
            .queue_delay_samples(self.queue_delay_samples.clone())
            .packet_size(BYTES_PER_PACKET)
            .conn_min_latency(self.min_latency)
            .build()
    }

    /// Clears per-interval counters, caching the RTT samples for the
    /// zero-ACK fallback.
    pub(crate) fn reset_obs(&mut self, now: Time) {
        self.sent = 0;
        self.acked = 0;
        self.lost = 0;
        if !self.rtt_samples.is_empty() {
            self.prev_rtt_samples = std::mem::take(&mut self.rtt_samples);
        } else {
            self.rtt_samples.clear();
        }
        self.rtt_samples_ts.clear();
        self.queue_delay_samples.clear();
        self.obs_start_time = now.as_secs_f64();
    }

    /// Folds the last interval's latency trend into the sending stage. The
    /// increase and decrease arms behave identically today; they stay
    /// separate because only the increase is a congestion signal.
    pub(crate) fn note_latency_trend(&mut self) {
        match self.lat_diff.partial_cmp(&0.0) {
            Some(Ordering::Greater) => self.start_stage = false,
            Some(Ordering::Less) => self.start_stage = false,
            Some(Ordering::Equal) | None => {}
        }
    }
}
