use std::collections::BinaryHeap;

use delegate::delegate;

use crate::time::Time;

use super::event::{Event, Packet};

/// The pending-event queue, ordered by time with FIFO tie-breaking.
#[derive(Debug, Default)]
pub(crate) struct Schedule {
    inner: BinaryHeap<Event>,
    next_seq: u64,
}

impl Schedule {
    pub(crate) fn push(&mut self, time: Time, pkt: Packet) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.inner.push(Event::new(time, seq, pkt));
    }

    delegate! {
        to self.inner {
            pub(crate) fn pop(&mut self) -> Option<Event>;
            pub(crate) fn peek(&self) -> Option<&Event>;
            pub(crate) fn is_empty(&self) -> bool;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::event::EventKind;

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
    fn pops_in_time_then_insertion_order() {
        let mut schedule = Schedule::default();
        schedule.push(Time::ONE, pkt(0));
        schedule.push(Time::ZERO, pkt(1));
        schedule.push(Time::ONE, pkt(2));
        assert_eq!(schedule.pop().unwrap().pkt.id, 1);
        assert_eq!(schedule.pop().unwrap().pkt.id, 0);
        assert_eq!(schedule.pop().unwrap().pkt.id, 2);
        assert!(schedule.is_empty());
    }
}
