// threatsim_env/src/lib.rs
//
// Python bindings for the threat simulation environments.
//
// Provides a Gym-style API for training agents:
// - Env: single-role environment (role="blocker" | "analyzer" | "defender")
// - MultiAgentEnv: blocker + analyzer over one shared event stream
//
// Observations are flat float lists [source_octet, dest_octet, protocol,
// packet_size]. Actions are integer indices. All operations are
// deterministic given seeds.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use threatsim::config::EnvConfig;
use threatsim::error::EnvError;
use threatsim::intel::IntelFeed;
use threatsim::rl::{
    Analyzer, Blocker, Defender, EventOrigin, FeedOrder, MultiAgentEnv as RustMultiAgentEnv,
    Observation, SimEnv, StepInfo, StepResult, OBS_DIM, OBS_VERSION,
};

fn env_err(err: EnvError) -> PyErr {
    match err {
        EnvError::InvalidAction { .. } | EnvError::Config(_) => {
            PyValueError::new_err(err.to_string())
        }
        EnvError::NotReset | EnvError::EpisodeDone { .. } => {
            PyRuntimeError::new_err(err.to_string())
        }
    }
}

fn observation_to_list(obs: &Observation) -> Vec<f32> {
    obs.features().to_vec()
}

/// Convert a StepInfo to a Python dictionary.
fn step_info_to_dict(py: Python<'_>, info: &StepInfo) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);

    // Metric counts
    dict.set_item("correct_blocks", info.metrics.correct_blocks)?;
    dict.set_item("false_positives", info.metrics.false_positives)?;
    dict.set_item("missed_threats", info.metrics.missed_threats)?;
    dict.set_item("correct_logs", info.metrics.correct_logs)?;
    dict.set_item("benign_allowed", info.metrics.benign_allowed)?;
    dict.set_item("incorrect_logs", info.metrics.incorrect_logs)?;

    dict.set_item("step", info.step)?;
    dict.set_item("cumulative_reward", info.cumulative_reward)?;
    dict.set_item("termination_reason", &info.termination_reason)?;

    match info.event_origin {
        Some(EventOrigin::Synthetic) => dict.set_item("event_origin", "synthetic")?,
        Some(EventOrigin::Fallback) => dict.set_item("event_origin", "fallback")?,
        Some(EventOrigin::Replay { index }) => {
            dict.set_item("event_origin", "replay")?;
            dict.set_item("replay_index", index)?;
        }
        None => dict.set_item("event_origin", py.None())?,
    }

    if let Some(decision) = &info.decision {
        let d = PyDict::new_bound(py);
        d.set_item("step", decision.step)?;
        d.set_item("action", decision.action)?;
        d.set_item("bucket", format!("{:?}", decision.bucket))?;
        d.set_item("is_threat", decision.is_threat)?;
        d.set_item("severity", decision.severity)?;
        dict.set_item("decision", d)?;
    }

    Ok(dict.into())
}

fn step_to_tuple(
    py: Python<'_>,
    result: StepResult,
) -> PyResult<(Vec<f32>, f64, bool, Py<PyDict>)> {
    let info = step_info_to_dict(py, &result.info)?;
    Ok((
        observation_to_list(&result.observation),
        result.reward,
        result.done,
        info,
    ))
}

/// Read one role's action index from a role-keyed dict.
fn role_action(actions: &Bound<'_, PyDict>, role: &str) -> PyResult<i64> {
    match actions.get_item(role)? {
        Some(value) => value.extract::<i64>(),
        None => Err(PyValueError::new_err(format!(
            "missing action for role '{role}'"
        ))),
    }
}

fn build_config(
    max_steps: u64,
    threat_probability: f64,
    base_seed: u64,
    feed_path: Option<&str>,
    shuffle_feed: bool,
) -> PyResult<EnvConfig> {
    let mut config = EnvConfig::default()
        .with_max_steps(max_steps)
        .with_threat_probability(threat_probability)
        .with_base_seed(base_seed)
        .with_feed_order(if shuffle_feed {
            FeedOrder::Shuffled
        } else {
            FeedOrder::Fixed
        });
    // An unreadable feed logs a warning and leaves the synthetic stream in place.
    if let Some(feed) = feed_path.and_then(IntelFeed::open_or_warn) {
        config = config.with_intel_feed(feed);
    }
    Ok(config)
}

enum RoleEnv {
    Blocker(SimEnv<Blocker>),
    Analyzer(SimEnv<Analyzer>),
    Defender(SimEnv<Defender>),
}

macro_rules! dispatch {
    ($env:expr, $inner:ident => $body:expr) => {
        match $env {
            RoleEnv::Blocker($inner) => $body,
            RoleEnv::Analyzer($inner) => $body,
            RoleEnv::Defender($inner) => $body,
        }
    };
}

/// Gym-style single-role environment.
///
/// Provides the standard RL interface:
/// - reset(seed) -> observation
/// - step(action) -> (observation, reward, done, info)
#[pyclass]
pub struct Env {
    inner: RoleEnv,
    role: &'static str,
}

#[pymethods]
impl Env {
    /// Create a new environment.
    ///
    /// Args:
    ///     role: "blocker", "analyzer" or "defender" (default: "blocker")
    ///     max_steps: Decisions per episode (default: 1000)
    ///     threat_probability: Chance a synthetic event is a threat (default: 0.2)
    ///     base_seed: Seeds episode seeds for reset() without a seed (default: 0)
    ///     feed_path: Optional JSON intel feed (file or threats_*.json directory)
    ///         to replay; falls back to synthetic events if it cannot be loaded
    ///     shuffle_feed: Replay the feed in a per-episode shuffled order
    #[new]
    #[pyo3(signature = (
        role="blocker",
        max_steps=1000,
        threat_probability=0.2,
        base_seed=0,
        feed_path=None,
        shuffle_feed=false
    ))]
    fn new(
        role: &str,
        max_steps: u64,
        threat_probability: f64,
        base_seed: u64,
        feed_path: Option<&str>,
        shuffle_feed: bool,
    ) -> PyResult<Self> {
        let config = build_config(
            max_steps,
            threat_probability,
            base_seed,
            feed_path,
            shuffle_feed,
        )?;
        let (inner, role) = match role {
            "blocker" => (RoleEnv::Blocker(SimEnv::new(config).map_err(env_err)?), "blocker"),
            "analyzer" => (
                RoleEnv::Analyzer(SimEnv::new(config).map_err(env_err)?),
                "analyzer",
            ),
            "defender" => (
                RoleEnv::Defender(SimEnv::new(config).map_err(env_err)?),
                "defender",
            ),
            _ => {
                return Err(PyValueError::new_err(format!(
                    "Unknown role: {}. Use 'blocker', 'analyzer', or 'defender'",
                    role
                )))
            }
        };
        Ok(Self { inner, role })
    }

    /// Reset the environment.
    ///
    /// Args:
    ///     seed: Optional seed for deterministic reset
    ///
    /// Returns:
    ///     observation: List of OBS_DIM floats
    #[pyo3(signature = (seed=None))]
    fn reset(&mut self, seed: Option<u64>) -> Vec<f32> {
        let obs = dispatch!(&mut self.inner, env => env.reset(seed));
        observation_to_list(&obs)
    }

    /// Take a step with an integer action.
    ///
    /// Returns:
    ///     Tuple of (observation, reward, done, info)
    fn step(
        &mut self,
        py: Python<'_>,
        action: i64,
    ) -> PyResult<(Vec<f32>, f64, bool, Py<PyDict>)> {
        let result =
            dispatch!(&mut self.inner, env => env.step_index(action)).map_err(env_err)?;
        step_to_tuple(py, result)
    }

    /// Fix the seed used by the next reset() without a seed.
    fn seed(&mut self, value: u64) {
        dispatch!(&mut self.inner, env => env.seed(value))
    }

    #[getter]
    fn role(&self) -> &'static str {
        self.role
    }

    /// Number of discrete actions for this role.
    #[getter]
    fn num_actions(&self) -> usize {
        dispatch!(&self.inner, env => env.num_actions())
    }

    /// (min, max) reward over every possible outcome.
    #[getter]
    fn reward_range(&self) -> (f64, f64) {
        dispatch!(&self.inner, env => env.reward_range())
    }
}

/// Two-role environment: blocker and analyzer share one event stream.
#[pyclass]
pub struct MultiAgentEnv {
    inner: RustMultiAgentEnv,
}

#[pymethods]
impl MultiAgentEnv {
    #[new]
    #[pyo3(signature = (
        max_steps=1000,
        threat_probability=0.2,
        base_seed=0,
        feed_path=None,
        shuffle_feed=false
    ))]
    fn new(
        max_steps: u64,
        threat_probability: f64,
        base_seed: u64,
        feed_path: Option<&str>,
        shuffle_feed: bool,
    ) -> PyResult<Self> {
        let config = build_config(
            max_steps,
            threat_probability,
            base_seed,
            feed_path,
            shuffle_feed,
        )?;
        let inner = RustMultiAgentEnv::new(config).map_err(env_err)?;
        Ok(Self { inner })
    }

    /// Reset both roles.
    ///
    /// Returns:
    ///     Dict {"blocker": observation, "analyzer": observation}
    #[pyo3(signature = (seed=None))]
    fn reset(&mut self, py: Python<'_>, seed: Option<u64>) -> PyResult<Py<PyDict>> {
        let obs = self.inner.reset(seed);
        let dict = PyDict::new_bound(py);
        dict.set_item("blocker", observation_to_list(&obs.blocker))?;
        dict.set_item("analyzer", observation_to_list(&obs.analyzer))?;
        Ok(dict.into())
    }

    /// Take a joint step.
    ///
    /// Args:
    ///     actions: Dict keyed by role, {"blocker": 0 | 1, "analyzer": 0 | 1}
    ///         blocker: 0 = allow, 1 = block
    ///         analyzer: 0 = log benign, 1 = log threat
    ///
    /// Returns:
    ///     Tuple of (observations, rewards, done, info), each dict keyed by role
    fn step(
        &mut self,
        py: Python<'_>,
        actions: &Bound<'_, PyDict>,
    ) -> PyResult<(Py<PyDict>, Py<PyDict>, bool, Py<PyDict>)> {
        let blocker = role_action(actions, "blocker")?;
        let analyzer = role_action(actions, "analyzer")?;
        let result = self
            .inner
            .step_indices(blocker, analyzer)
            .map_err(env_err)?;

        let obs = PyDict::new_bound(py);
        obs.set_item("blocker", observation_to_list(&result.observation.blocker))?;
        obs.set_item("analyzer", observation_to_list(&result.observation.analyzer))?;

        let rewards = PyDict::new_bound(py);
        rewards.set_item("blocker", result.reward.blocker)?;
        rewards.set_item("analyzer", result.reward.analyzer)?;

        let info = PyDict::new_bound(py);
        info.set_item("blocker", step_info_to_dict(py, &result.info.blocker)?)?;
        info.set_item("analyzer", step_info_to_dict(py, &result.info.analyzer)?)?;

        Ok((obs.into(), rewards.into(), result.done, info.into()))
    }

    /// Fix the seed used by the next reset() without a seed.
    fn seed(&mut self, value: u64) {
        self.inner.seed(value)
    }
}

/// Current observation schema version.
#[pyfunction]
fn obs_version() -> u32 {
    OBS_VERSION
}

/// Length of an observation vector.
#[pyfunction]
fn obs_dim() -> usize {
    OBS_DIM
}

#[pymodule]
fn threatsim_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Env>()?;
    m.add_class::<MultiAgentEnv>()?;
    m.add_function(wrap_pyfunction!(obs_version, m)?)?;
    m.add_function(wrap_pyfunction!(obs_dim, m)?)?;
    Ok(())
}
