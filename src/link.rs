use rand::{rngs::StdRng, Rng};

use crate::{time::Time, trace::Trace, units::BYTES_PER_PACKET};

/// One directed hop: trace-driven capacity, propagation delay, and a bounded
/// drop-tail queue measured in packets.
///
/// Queue occupancy is fractional: it drains continuously at the link's current
/// capacity and grows by one packet per admission. All mutation happens from
/// the engine's event dispatch, so occupancy is only ever updated at
/// non-decreasing timestamps.
#[derive(Debug, typed_builder::TypedBuilder)]
pub(crate) struct Link {
    /// Queue capacity in packets.
    queue_size: u64,
    /// Upper bound of the multiplicative latency jitter, e.g. `1.1` for up to
    /// 10% inflation. `None` disables jitter.
    #[builder(default)]
    max_jitter: Option<f64>,
    #[builder(default, setter(skip))]
    pkt_in_queue: f64,
    #[builder(default, setter(skip))]
    drained_at: Time,
}

impl Link {
    /// Current capacity in packets per second.
    pub(crate) fn bandwidth(&self, trace: &mut Trace, now: Time) -> f64 {
        trace.bandwidth_at(now) * 1e6 / BYTES_PER_PACKET.into_bits() as f64
    }

    /// Queueing delay in seconds contributed by packets currently buffered,
    /// after draining the occupancy accumulated since the last update.
    pub(crate) fn cur_queue_delay(&mut self, trace: &mut Trace, now: Time) -> f64 {
        let bw = self.bandwidth(trace, now);
        let elapsed = (now - self.drained_at).as_secs_f64();
        self.pkt_in_queue = (self.pkt_in_queue - elapsed * bw).max(0.0);
        self.drained_at = now;
        self.pkt_in_queue.ceil() / bw
    }

    /// One-way latency in seconds: jittered propagation delay plus the current
    /// queueing delay.
    pub(crate) fn cur_latency(&mut self, trace: &mut Trace, rng: &mut StdRng, now: Time) -> f64 {
        let queue_delay = self.cur_queue_delay(trace, now);
        let mut prop = trace.delay_at(now) / 1000.0;
        if let Some(max_jitter) = self.max_jitter {
            // Inclusive so a bound of exactly 1.0 degenerates to no jitter.
            prop *= rng.random_range(1.0..=max_jitter);
        }
        prop + queue_delay
    }

    /// Admission decision for one packet: `false` on a random uplink loss draw
    /// or when the queue is full. Admission occupies one queue slot.
    pub(crate) fn packet_enters_link(
        &mut self,
        trace: &mut Trace,
        rng: &mut StdRng,
        now: Time,
    ) -> bool {
        // The loss draw comes first so the RNG stream does not depend on
        // queue occupancy.
        if rng.random::<f64>() < trace.loss_rate() {
            return false;
        }
        let _ = self.cur_queue_delay(trace, now);
        if 1.0 + self.pkt_in_queue.ceil() > self.queue_size as f64 {
            return false;
        }
        self.pkt_in_queue += 1.0;
        true
    }

    pub(crate) fn pkt_in_queue(&self) -> f64 {
        self.pkt_in_queue
    }

    pub(crate) fn reset(&mut self) {
        self.pkt_in_queue = 0.0;
        self.drained_at = Time::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn ideal_trace(loss: f64, queue: u64) -> Trace {
        // 12 Mbps over 1500-byte packets is exactly 1000 packets/sec.
        Trace::constant(30.0, 12.0, 20.0, loss, queue).unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn bandwidth_in_packets_per_sec() {
        let link = Link::builder().queue_size(50).build();
        let mut tr = ideal_trace(0.0, 50);
        assert_eq!(link.bandwidth(&mut tr, Time::ZERO), 1000.0);
    }

    #[test]
    fn admission_fills_queue_then_drops() {
        let mut link = Link::builder().queue_size(2).build();
        let mut tr = ideal_trace(0.0, 2);
        let mut rng = rng();
        let now = Time::ZERO;
        assert!(link.packet_enters_link(&mut tr, &mut rng, now));
        assert!(link.packet_enters_link(&mut tr, &mut rng, now));
        // Queue full: third packet at the same instant overflows.
        assert!(!link.packet_enters_link(&mut tr, &mut rng, now));
        assert_eq!(link.pkt_in_queue(), 2.0);
    }

    #[test]
    fn occupancy_drains_at_capacity() {
        let mut link = Link::builder().queue_size(50).build();
        let mut tr = ideal_trace(0.0, 50);
        let mut rng = rng();
        for _ in 0..10 {
            assert!(link.packet_enters_link(&mut tr, &mut rng, Time::ZERO));
        }
        // At 1000 pps, ten packets drain in 10 ms.
        let delay = link.cur_queue_delay(&mut tr, Time::from_secs_f64(0.01));
        assert_eq!(delay, 0.0);
        assert_eq!(link.pkt_in_queue(), 0.0);
    }

    #[test]
    fn queue_delay_counts_buffered_packets() {
        let mut link = Link::builder().queue_size(50).build();
        let mut tr = ideal_trace(0.0, 50);
        let mut rng = rng();
        for _ in 0..10 {
            assert!(link.packet_enters_link(&mut tr, &mut rng, Time::ZERO));
        }
        let delay = link.cur_queue_delay(&mut tr, Time::ZERO);
        assert!((delay - 0.01).abs() < 1e-12);
    }

    #[test]
    fn certain_loss_never_admits() {
        let mut link = Link::builder().queue_size(50).build();
        let mut tr = ideal_trace(1.0, 50);
        let mut rng = rng();
        for _ in 0..100 {
            assert!(!link.packet_enters_link(&mut tr, &mut rng, Time::ZERO));
        }
        assert_eq!(link.pkt_in_queue(), 0.0);
    }

    #[test]
    fn latency_includes_propagation_and_queue() {
        let mut link = Link::builder().queue_size(50).build();
        let mut tr = ideal_trace(0.0, 50);
        let mut rng = rng();
        assert!(link.packet_enters_link(&mut tr, &mut rng, Time::ZERO));
        let lat = link.cur_latency(&mut tr, &mut rng, Time::ZERO);
        // 20 ms propagation + 1 ms serialization of the queued packet.
        assert!((lat - 0.021).abs() < 1e-12);
    }

    #[test]
    fn jitter_bound_of_one_is_inert() {
        let mut link = Link::builder().queue_size(50).max_jitter(Some(1.0)).build();
        let mut tr = ideal_trace(0.0, 50);
        let mut rng = rng();
        for _ in 0..100 {
            let lat = link.cur_latency(&mut tr, &mut rng, Time::ZERO);
            assert_eq!(lat, 0.02);
        }
    }

    #[test]
    fn jitter_inflates_within_bounds() {
        let mut link = Link::builder().queue_size(50).max_jitter(Some(1.5)).build();
        let mut tr = ideal_trace(0.0, 50);
        let mut rng = rng();
        for _ in 0..100 {
            let lat = link.cur_latency(&mut tr, &mut rng, Time::ZERO);
            assert!(lat >= 0.02);
            assert!(lat <= 0.03);
        }
    }

    #[test]
    fn reset_clears_occupancy() {
        let mut link = Link::builder().queue_size(50).build();
        let mut tr = ideal_trace(0.0, 50);
        let mut rng = rng();
        assert!(link.packet_enters_link(&mut tr, &mut rng, Time::ZERO));
        link.reset();
        assert_eq!(link.pkt_in_queue(), 0.0);
    }
}
