/// A packet-level trace record, one row per lifecycle event.
///
/// Rates are in bits per second, times and delays in seconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PacketRecord {
    /// Simulation time of the event.
    pub timestamp: f64,
    pub packet_id: u64,
    pub kind: PacketEventKind,
    /// Packet size in bytes.
    pub bytes: u64,
    /// Accumulated one-way or round-trip latency at the event.
    pub latency: f64,
    /// Accumulated queueing delay at the event.
    pub queue_delay: f64,
    /// Bottleneck queue occupancy when the event fired.
    pub pkt_in_queue: f64,
    /// The sender's pacing rate at the event.
    pub send_rate: f64,
    /// The bottleneck capacity at the event.
    pub bandwidth: f64,
}

/// Where in its lifecycle a logged packet was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketEventKind {
    /// Emitted by the sender onto the first hop.
    Sent,
    /// Acknowledgment delivered back to the sender.
    Acked,
    /// Reported lost on acknowledgment return.
    Lost,
    /// Turned around at the destination.
    Arrived,
}
