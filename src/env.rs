use rand::{rngs::StdRng, SeedableRng};
use tracing::debug;

use crate::{
    monitor::Feature,
    network::{MiReport, Network},
    reward::REWARD_SCALE,
    sender::{CcKind, Sender},
    time::Time,
    trace::Trace,
};

/// Interval duration used until the first RTT measurement exists.
const BOOTSTRAP_RUN_DUR: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid trace: {0}")]
    InvalidTrace(String),

    #[error("unsupported congestion control {0:?}")]
    UnsupportedCc(String),

    #[error("unknown feature {0:?}")]
    UnknownFeature(String),

    #[error("serde error")]
    Serde(#[from] serde_json::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, typed_builder::TypedBuilder)]
pub struct Config {
    trace: Trace,

    #[builder(default = CcKind::Aurora)]
    cc: CcKind,
    #[builder(default = 10)]
    history_len: usize,
    #[builder(default = Feature::default_set())]
    features: Vec<Feature>,
    /// Scale applied to policy deltas before they reach the sender.
    #[builder(default = 1.0)]
    delta_scale: f64,

    seed: u64,
    #[builder(default)]
    log_packets: bool,
    /// Multiplicative latency jitter bound, e.g. `1.1`. `None` disables it.
    #[builder(default, setter(strip_option))]
    max_jitter: Option<f64>,
}

/// One policy action: a rate delta, and a window delta when the congestion
/// control is window-based.
#[derive(Debug, Clone, Copy, PartialEq, derive_new::new)]
pub struct Action {
    pub rate_delta: f64,
    #[new(default)]
    pub cwnd_delta: Option<f64>,
}

/// The outcome of one environment step.
#[derive(Debug, Clone)]
pub struct Step {
    /// Flattened feature history, oldest interval first.
    pub observation: Vec<f64>,
    /// Scaled reward for the interval.
    pub reward: f64,
    /// True once the trace has been exhausted.
    pub done: bool,
    pub info: MiReport,
}

/// A single-flow congestion-control environment over one trace.
///
/// Each episode replays the configured trace from the start; `reset` rebuilds
/// every simulation entity and reseeds the RNG, so two episodes with the same
/// config are bit-identical.
#[derive(Debug)]
pub struct Env {
    config: Config,
    network: Network,
    run_dur: f64,
}

impl Env {
    pub fn new(config: Config) -> Result<Self, Error> {
        config.trace.validate()?;
        let network = Self::build_network(&config);
        let mut env = Self {
            config,
            network,
            run_dur: BOOTSTRAP_RUN_DUR,
        };
        env.bootstrap();
        Ok(env)
    }

    fn build_network(config: &Config) -> Network {
        let mut trace = config.trace.clone();
        trace.reset();
        // Start at ten packets per round-trip.
        let rtt = trace.delay_at(Time::ZERO) * 2.0 / 1000.0;
        let starting_rate = 10.0 / rtt;
        let sender = Sender::new(
            starting_rate,
            config.cc.into(),
            config.delta_scale,
            config.history_len,
        );
        Network::new(
            trace,
            sender,
            StdRng::seed_from_u64(config.seed),
            config.max_jitter,
            config.log_packets,
        )
    }

    /// Runs the warmup interval that produces the first observation.
    fn bootstrap(&mut self) {
        let report = self.network.run_for_dur(self.run_dur);
        if let Some(dur) = report.next_run_dur {
            self.run_dur = dur;
        }
        debug!(run_dur = self.run_dur, "episode started");
    }

    /// Starts a fresh episode and returns its initial observation.
    pub fn reset(&mut self) -> Vec<f64> {
        self.network = Self::build_network(&self.config);
        self.run_dur = BOOTSTRAP_RUN_DUR;
        self.bootstrap();
        self.observation()
    }

    /// Applies one action, simulates one measurement interval, and returns
    /// the outcome.
    pub fn step(&mut self, action: &Action) -> Step {
        let sender = &mut self.network.sender;
        sender.apply_rate_delta(action.rate_delta);
        if self.config.cc == CcKind::Cubic {
            if let Some(cwnd_delta) = action.cwnd_delta {
                sender.apply_cwnd_delta(cwnd_delta);
            }
        }
        let report = self.network.run_for_dur(self.run_dur);
        if let Some(dur) = report.next_run_dur {
            self.run_dur = dur;
        }
        Step {
            observation: self.observation(),
            reward: report.reward * REWARD_SCALE,
            done: self.network.trace_finished(),
            info: report,
        }
    }

    /// The flattened feature history, oldest interval first.
    pub fn observation(&self) -> Vec<f64> {
        self.network
            .sender
            .history
            .as_array(&self.config.features)
    }

    /// Minimum RTT observed this episode, in seconds.
    pub fn min_rtt(&self) -> f64 {
        self.network.sender.min_rtt
    }

    /// Whether any acknowledgment has been delivered this episode.
    pub fn got_data(&self) -> bool {
        self.network.sender.got_data
    }

    pub fn packet_log(&self) -> &[crate::data::PacketRecord] {
        self.network.packet_log()
    }
}
