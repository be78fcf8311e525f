#![allow(clippy::non_canonical_partial_ord_impl)]

use std::cmp::Reverse;

use smallvec::SmallVec;

use crate::time::Time;

// A dispatch yields at most the forwarded packet plus the next paced send.
pub(crate) type EventList = SmallVec<[(Time, Packet); 2]>;

/// Which direction a packet is traveling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Send,
    Ack,
}

/// A packet in flight, carried as the payload of a scheduled event.
///
/// `latency` and `queue_delay` accumulate per hop, in seconds.
#[derive(Debug, Clone)]
pub(crate) struct Packet {
    pub(crate) id: u64,
    pub(crate) kind: EventKind,
    /// Index of the next hop to traverse.
    pub(crate) hop: usize,
    pub(crate) latency: f64,
    pub(crate) queue_delay: f64,
    pub(crate) dropped: bool,
    /// RTO in effect when the packet was emitted; `None` disables timeout
    /// detection for this packet.
    pub(crate) rto: Option<f64>,
}

#[derive(Debug, derivative::Derivative)]
#[derivative(PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Event {
    time: Reverse<Time>,
    /// Insertion order, breaking ties between same-time events.
    seq: Reverse<u64>,
    #[derivative(PartialEq = "ignore", PartialOrd = "ignore", Ord = "ignore")]
    pub(crate) pkt: Packet,
}

impl Event {
    pub(crate) fn new(time: Time, seq: u64, pkt: Packet) -> Self {
        assert!(pkt.latency.is_finite(), "packet latency must be finite");
        Self {
            time: Reverse(time),
            seq: Reverse(seq),
            pkt,
        }
    }

    pub(crate) fn time(&self) -> Time {
        self.time.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(id: u64) -> Packet {
        Packet {
            id,
            kind: EventKind::Send,
            hop: 0,
            latency: 0.0,
            queue_delay: 0.0,
            dropped: false,
            rto: None,
        }
    }

    #[test]
    fn event_order() {
        let e1 = Event::new(Time::ZERO, 0, pkt(0));
        let e2 = Event::new(Time::ONE, 1, pkt(1));
        assert!(e1 > e2);
    }

    #[test]
    fn same_time_breaks_ties_by_insertion() {
        let e1 = Event::new(Time::ONE, 0, pkt(0));
        let e2 = Event::new(Time::ONE, 1, pkt(1));
        assert!(e1 > e2);
    }
}
