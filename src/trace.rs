use std::path::Path;

use crate::{env::Error, time::Time};

/// A time-varying network profile driving link behavior over one episode.
///
/// Bandwidth and delay are piecewise-constant between breakpoints; the last
/// timestamp marks the end of the trace. Lookups share a monotone cursor, so
/// within one episode queries must use non-decreasing timestamps.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Trace {
    /// Breakpoint timestamps in seconds.
    timestamps: Vec<f64>,
    /// Bandwidth at each breakpoint, in Mbps.
    bandwidths: Vec<f64>,
    /// One-way propagation delay at each breakpoint, in milliseconds.
    delays: Vec<f64>,
    /// Random uplink packet loss rate in `[0, 1]`.
    #[serde(rename = "loss")]
    loss_rate: f64,
    /// Bottleneck queue capacity in packets.
    #[serde(rename = "queue")]
    queue_size: u64,
    #[serde(skip)]
    cursor: usize,
}

impl Trace {
    pub fn new(
        timestamps: Vec<f64>,
        bandwidths: Vec<f64>,
        delays: Vec<f64>,
        loss_rate: f64,
        queue_size: u64,
    ) -> Result<Self, Error> {
        let trace = Self {
            timestamps,
            bandwidths,
            delays,
            loss_rate,
            queue_size,
            cursor: 0,
        };
        trace.validate()?;
        Ok(trace)
    }

    /// A constant-profile trace lasting `duration` seconds.
    pub fn constant(
        duration: f64,
        bandwidth_mbps: f64,
        delay_ms: f64,
        loss_rate: f64,
        queue_size: u64,
    ) -> Result<Self, Error> {
        Self::new(
            vec![duration],
            vec![bandwidth_mbps],
            vec![delay_ms],
            loss_rate,
            queue_size,
        )
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.timestamps.is_empty() {
            return Err(Error::InvalidTrace("empty timestamp list".into()));
        }
        if self.timestamps.len() != self.bandwidths.len()
            || self.timestamps.len() != self.delays.len()
        {
            return Err(Error::InvalidTrace(format!(
                "length mismatch: {} timestamps, {} bandwidths, {} delays",
                self.timestamps.len(),
                self.bandwidths.len(),
                self.delays.len()
            )));
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(Error::InvalidTrace(format!(
                "loss rate {} outside [0, 1]",
                self.loss_rate
            )));
        }
        Ok(())
    }

    fn seek(&mut self, ts: f64) {
        while self.cursor + 1 < self.timestamps.len() && self.timestamps[self.cursor + 1] <= ts {
            self.cursor += 1;
        }
    }

    /// Bandwidth in Mbps at simulation time `t`.
    pub fn bandwidth_at(&mut self, t: Time) -> f64 {
        self.seek(t.as_secs_f64());
        self.bandwidths[self.cursor]
    }

    /// One-way propagation delay in milliseconds at simulation time `t`.
    pub fn delay_at(&mut self, t: Time) -> f64 {
        self.seek(t.as_secs_f64());
        self.delays[self.cursor]
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    pub fn queue_size(&self) -> u64 {
        self.queue_size
    }

    pub fn is_finished(&self, t: Time) -> bool {
        t.as_secs_f64() >= self.duration()
    }

    /// The last breakpoint timestamp, in seconds.
    pub fn duration(&self) -> f64 {
        *self
            .timestamps
            .last()
            .expect("validated trace is non-empty")
    }

    pub fn end_time(&self) -> Time {
        Time::from_secs_f64(self.duration())
    }

    /// Rewinds the lookup cursor to the start of the trace.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn avg_bandwidth_mbps(&self) -> f64 {
        self.bandwidths.iter().sum::<f64>() / self.bandwidths.len() as f64
    }

    pub fn avg_delay_ms(&self) -> f64 {
        self.delays.iter().sum::<f64>() / self.delays.len() as f64
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        let trace: Trace = serde_json::from_str(&s)?;
        trace.validate()?;
        Ok(trace)
    }

    pub fn dump(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let s = serde_json::to_string_pretty(self)?;
        std::fs::write(path, s)?;
        Ok(())
    }
}
