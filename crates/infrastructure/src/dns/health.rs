//! Upstream health scoring: time-decayed EWMA, sliding-window circuit
//! breaker, tiered hedge delay.
//!
//! The update logic is a set of pure functions over `ServerRuntimeState`
//! so the EWMA/circuit-breaker math is table-testable without sockets or
//! timers. Callers own the `RwLock<ServerRuntimeState>` and the clock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW_SIZE: usize = 5;
const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;
const LIVE_HALF_LIFE_SECS: f64 = 10.0;
const PROBE_HALF_LIFE_SECS: f64 = 5.0;
const MEDIUM_DRIFT_HALF_LIFE_SECS: f64 = 60.0;
const MEDIUM_DRIFT_TARGET: f64 = 0.9;

/// Capability bits advertised by an upstream, as learned by the prober
/// or inferred at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const TCP: Self = Self(1 << 0);
    pub const PIPELINE: Self = Self(1 << 1);
    pub const EDNS0: Self = Self(1 << 2);
    pub const DO: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn set(&mut self, bit: Self) {
        self.0 |= bit.0;
    }

    pub fn has(&self, bit: Self) -> bool {
        self.0 & bit.0 != 0
    }
}

/// Outcome of a single upstream exchange, as fed into the EWMA update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// NOERROR or NXDOMAIN or FORMERR.
    Healthy,
    /// SERVFAIL, NOTIMP, REFUSED, or any other non-transport rcode.
    Degraded,
    /// Connect/timeout/transport-level failure — no response at all.
    NetworkError,
}

impl Outcome {
    fn observed_value(self) -> f64 {
        match self {
            Outcome::Healthy => 1.0,
            Outcome::Degraded => 0.3,
            Outcome::NetworkError => 0.0,
        }
    }

    fn is_success(self) -> bool {
        matches!(self, Outcome::Healthy)
    }
}

/// Per-(address,port) runtime state. Owned behind a lock by the
/// forwarder's server map.
#[derive(Debug, Clone)]
pub struct ServerRuntimeState {
    pub queries: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_response_time_us: u64,

    pub window_queries: u64,
    pub window_start: Instant,

    pub score: f64,
    pub latency_ms: f64,
    pub last_score_update: Instant,

    pub outcomes: VecDeque<bool>,

    pub broken: bool,
    pub probe_mode: bool,
    pub consecutive_failures: u32,

    pub capabilities: Capabilities,
    pub probe_count: u64,
    pub avg_probe_rtt_ms: f64,
    pub healthy: bool,

    pub last_query: Option<Instant>,
    pub last_success: Option<Instant>,
    pub last_health_probe: Option<Instant>,
}

impl ServerRuntimeState {
    pub fn new(now: Instant) -> Self {
        Self {
            queries: 0,
            successes: 0,
            failures: 0,
            total_response_time_us: 0,
            window_queries: 0,
            window_start: now,
            score: 1.0,
            latency_ms: 0.0,
            last_score_update: now,
            outcomes: VecDeque::with_capacity(WINDOW_SIZE),
            broken: false,
            probe_mode: false,
            consecutive_failures: 0,
            capabilities: Capabilities::empty(),
            probe_count: 0,
            avg_probe_rtt_ms: 0.0,
            healthy: true,
            last_query: None,
            last_success: None,
            last_health_probe: None,
        }
    }

    /// Not broken and score at or above the eligibility threshold.
    pub fn is_available(&self) -> bool {
        !self.broken && self.score >= 0.5
    }

    pub fn recent_failure_count(&self) -> usize {
        self.outcomes.iter().filter(|ok| !**ok).count()
    }
}

fn ewma_alpha(dt_secs: f64, half_life_secs: f64) -> f64 {
    let dt = dt_secs.max(0.0);
    1.0 - (-std::f64::consts::LN_2 * dt / half_life_secs).exp()
}

/// Applies a live-traffic observation: updates EWMA score/latency, the
/// sliding window, consecutive-failure streak, and circuit breaker.
pub fn apply_live_observation(
    state: &mut ServerRuntimeState,
    outcome: Outcome,
    latency: Option<Duration>,
    now: Instant,
) {
    let dt = now.duration_since(state.last_score_update).as_secs_f64();
    apply_score(state, outcome, LIVE_HALF_LIFE_SECS, dt);
    apply_latency(state, outcome, latency, dt);
    state.last_score_update = now;
    apply_window_and_circuit(state, outcome, now);

    state.queries += 1;
    state.last_query = Some(now);
    if outcome.is_success() {
        state.successes += 1;
        state.last_success = Some(now);
    } else {
        state.failures += 1;
    }
    if let Some(lat) = latency {
        state.total_response_time_us += lat.as_micros() as u64;
    }
}

/// Applies a health-probe observation: only SERVFAIL lowers the score;
/// any other rcode counts as healthy. Uses the shorter probe half-life.
pub fn apply_probe_observation(state: &mut ServerRuntimeState, is_servfail: bool, now: Instant) {
    let outcome = if is_servfail { Outcome::Degraded } else { Outcome::Healthy };
    let dt = now.duration_since(state.last_score_update).as_secs_f64();
    apply_score(state, outcome, PROBE_HALF_LIFE_SECS, dt);
    state.last_score_update = now;
    apply_window_and_circuit(state, outcome, now);
    state.last_health_probe = Some(now);
}

fn apply_score(state: &mut ServerRuntimeState, outcome: Outcome, half_life: f64, dt: f64) {
    let alpha = ewma_alpha(dt, half_life);
    let v = outcome.observed_value();
    state.score = (alpha * v + (1.0 - alpha) * state.score).clamp(0.0, 1.0);
}

fn apply_latency(state: &mut ServerRuntimeState, outcome: Outcome, latency: Option<Duration>, dt: f64) {
    if outcome != Outcome::Healthy {
        return;
    }
    let Some(latency) = latency else { return };
    let ms = latency.as_secs_f64() * 1000.0;
    if ms < 0.0 {
        return;
    }
    if state.queries == 0 {
        state.latency_ms = ms;
        return;
    }
    let alpha = ewma_alpha(dt, LIVE_HALF_LIFE_SECS);
    state.latency_ms = alpha * ms + (1.0 - alpha) * state.latency_ms;
}

fn apply_window_and_circuit(state: &mut ServerRuntimeState, outcome: Outcome, now: Instant) {
    let success = outcome.is_success();

    state.outcomes.push_back(success);
    while state.outcomes.len() > WINDOW_SIZE {
        state.outcomes.pop_front();
    }

    if success {
        state.consecutive_failures = 0;
    } else {
        state.consecutive_failures += 1;
    }

    if !state.broken && state.consecutive_failures >= CONSECUTIVE_FAILURE_THRESHOLD {
        state.broken = true;
        state.probe_mode = true;
        let _ = now;
    }
}

/// Recovery from the circuit-probe path: a successful probe against a
/// broken server clears the breaker and resets score to 0.5.
pub fn reset_circuit_breaker(state: &mut ServerRuntimeState) {
    state.broken = false;
    state.probe_mode = false;
    state.consecutive_failures = 0;
    state.score = 0.5;
}

/// Extra delay applied to a lower-scored server within a priority band,
/// so better servers get a head start (tiered hedging).
pub fn tiered_hedge_delay(score: f64) -> Duration {
    if score >= 0.8 {
        Duration::ZERO
    } else if score >= 0.6 {
        Duration::from_millis(5)
    } else {
        Duration::from_millis(15)
    }
}

/// Idle upward drift for mid-scoring servers: every 10s tick, servers
/// with 0.6 <= score < 0.8 decay toward 0.9 with a 60s half-life, so a
/// historically-good server regains eligibility without live traffic.
pub fn apply_medium_score_drift(state: &mut ServerRuntimeState, now: Instant) {
    if !(0.6..0.8).contains(&state.score) {
        return;
    }
    let dt = now.duration_since(state.last_score_update).as_secs_f64();
    let alpha = ewma_alpha(dt, MEDIUM_DRIFT_HALF_LIFE_SECS);
    state.score = (alpha * MEDIUM_DRIFT_TARGET + (1.0 - alpha) * state.score).clamp(0.0, 1.0);
    state.last_score_update = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_stays_in_unit_range() {
        let mut state = ServerRuntimeState::new(Instant::now());
        let mut now = Instant::now();
        for _ in 0..50 {
            now += Duration::from_millis(100);
            apply_live_observation(&mut state, Outcome::NetworkError, None, now);
            assert!((0.0..=1.0).contains(&state.score));
        }
    }

    #[test]
    fn all_healthy_observations_converge_to_one() {
        let mut state = ServerRuntimeState::new(Instant::now());
        state.score = 0.2;
        let mut now = Instant::now();
        let mut prev = state.score;
        for _ in 0..30 {
            now += Duration::from_secs(1);
            apply_live_observation(&mut state, Outcome::Healthy, Some(Duration::from_millis(10)), now);
            assert!(state.score >= prev);
            prev = state.score;
        }
        assert!(state.score > 0.95);
    }

    #[test]
    fn window_never_exceeds_configured_size() {
        let mut state = ServerRuntimeState::new(Instant::now());
        let mut now = Instant::now();
        for _ in 0..20 {
            now += Duration::from_millis(10);
            apply_live_observation(&mut state, Outcome::Healthy, Some(Duration::from_millis(1)), now);
        }
        assert!(state.outcomes.len() <= WINDOW_SIZE);
    }

    #[test]
    fn five_consecutive_failures_trip_breaker() {
        let mut state = ServerRuntimeState::new(Instant::now());
        let mut now = Instant::now();
        for i in 0..5 {
            now += Duration::from_millis(10);
            apply_live_observation(&mut state, Outcome::NetworkError, None, now);
            if i < 4 {
                assert!(!state.broken);
            }
        }
        assert!(state.broken);
        assert!(state.probe_mode);
    }

    #[test]
    fn reset_clears_breaker_and_sets_half_score() {
        let mut state = ServerRuntimeState::new(Instant::now());
        state.broken = true;
        state.probe_mode = true;
        state.consecutive_failures = 9;
        reset_circuit_breaker(&mut state);
        assert!(!state.broken);
        assert!(!state.probe_mode);
        assert_eq!(state.score, 0.5);
    }

    #[test]
    fn probe_observation_ignores_non_servfail_rcodes() {
        let mut state = ServerRuntimeState::new(Instant::now());
        state.score = 0.2;
        let now = Instant::now() + Duration::from_secs(5);
        apply_probe_observation(&mut state, false, now);
        assert!(state.score > 0.2);
    }

    #[test]
    fn live_latency_ewma_keeps_decaying_past_the_first_sample() {
        let mut state = ServerRuntimeState::new(Instant::now());
        let mut now = Instant::now();

        now += Duration::from_secs(1);
        apply_live_observation(&mut state, Outcome::Healthy, Some(Duration::from_millis(100)), now);
        assert_eq!(state.latency_ms, 100.0);

        now += Duration::from_secs(1);
        apply_live_observation(&mut state, Outcome::Healthy, Some(Duration::from_millis(10)), now);
        assert!(
            state.latency_ms < 100.0,
            "a second, much faster sample should pull the EWMA down, not leave it frozen at the seed value"
        );
    }

    #[test]
    fn tiered_delay_thresholds() {
        assert_eq!(tiered_hedge_delay(0.9), Duration::ZERO);
        assert_eq!(tiered_hedge_delay(0.8), Duration::ZERO);
        assert_eq!(tiered_hedge_delay(0.7), Duration::from_millis(5));
        assert_eq!(tiered_hedge_delay(0.6), Duration::from_millis(5));
        assert_eq!(tiered_hedge_delay(0.59), Duration::from_millis(15));
    }

    #[test]
    fn medium_score_drifts_upward_only_in_band() {
        let mut state = ServerRuntimeState::new(Instant::now());
        state.score = 0.7;
        state.last_score_update = Instant::now();
        let now = state.last_score_update + Duration::from_secs(10);
        apply_medium_score_drift(&mut state, now);
        assert!(state.score > 0.7);

        state.score = 0.9;
        let prev = state.score;
        apply_medium_score_drift(&mut state, now + Duration::from_secs(10));
        assert_eq!(state.score, prev, "drift only applies in the 0.6..0.8 band");
    }
}
