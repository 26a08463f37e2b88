use std::env;

use crate::math::R;

pub const DEFAULT_MAX_QUBITS: u16 = 32;
pub const DEFAULT_PRECISION: R = 1e-10;

pub const ENV_MAX_QUBITS: &str = "QVM_MAX_QUBITS";
pub const ENV_PRECISION: &str = "QVM_PRECISION";
pub const ENV_DEBUG_MODE: &str = "QVM_DEBUG_MODE";
pub const ENV_LOG_LEVEL: &str = "QVM_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "QVM_LOG_FILE";

/// Virtual machine configuration.
///
/// `max_qubits` bounds both the live handle count and the state-vector
/// width; `precision` is the ε used by every normalization check. The log
/// settings are carried for the embedding host: the library itself only
/// emits through the [`log`] facade and never installs a logger.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_qubits: u16,
    pub precision: R,
    pub debug: bool,
    /// Seed for the measurement RNG. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_qubits: DEFAULT_MAX_QUBITS,
            precision: DEFAULT_PRECISION,
            debug: false,
            seed: None,
            log_level: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Build a configuration from the `QVM_*` environment variables.
    ///
    /// Malformed values are reported with a warning and fall back to the
    /// defaults. Programmatic configuration always takes precedence over
    /// the environment; this constructor is the convenience path.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(raw) = read_var(ENV_MAX_QUBITS) {
            match raw.parse::<u16>() {
                Ok(n) if n > 0 => config.max_qubits = n,
                _ => log::warn!(
                    "{}={:?} is not a positive integer, using {}",
                    ENV_MAX_QUBITS,
                    raw,
                    config.max_qubits
                ),
            }
        }

        if let Some(raw) = read_var(ENV_PRECISION) {
            match raw.parse::<R>() {
                Ok(eps) if eps > 0.0 && eps.is_finite() => config.precision = eps,
                _ => log::warn!(
                    "{}={:?} is not a positive float, using {}",
                    ENV_PRECISION,
                    raw,
                    config.precision
                ),
            }
        }

        if let Some(raw) = read_var(ENV_DEBUG_MODE) {
            config.debug = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        config.log_level = read_var(ENV_LOG_LEVEL);
        config.log_file = read_var(ENV_LOG_FILE);

        config
    }
}

fn read_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
