/// Scale applied to interval rewards before they reach the policy.
pub const REWARD_SCALE: f64 = 0.001;

/// Linear reward over one measurement interval.
///
/// `throughput` and `avg_bw` are in packets per second, `latency` is the mean
/// RTT in seconds, `loss` is a ratio in `[0, 1]`. Throughput is normalized by
/// the trace's average capacity so the trade-off weights transfer across
/// bandwidth regimes.
pub fn aurora_reward(throughput: f64, latency: f64, loss: f64, avg_bw: f64, _min_rtt: f64) -> f64 {
    10.0 * 50.0 * throughput / avg_bw - 1000.0 * latency - 2000.0 * loss
}
