use std::sync::OnceLock;

use serde::Deserialize;

fn default_deadlock_timeout() -> f64 {
    600.0
}

fn default_backend() -> String {
    "local".to_owned()
}

fn default_threads() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.into(),
        Err(_) => 4,
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    /// Seconds a processor may sit in a barrier before a deadlock warning is
    /// logged, default: 600.0 seconds
    #[serde(default = "default_deadlock_timeout")]
    pub deadlock_timeout: f64,

    /// The fabric backend to use
    /// local -- single processor execution, the default
    /// thread -- multi processor single process execution
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Number of processors an `Environment` spawns when not set explicitly,
    /// default: available parallelism
    #[serde(default = "default_threads")]
    pub threads: usize,
}

/// Get the current environment variable configuration
pub fn config() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(|| match envy::prefixed("STRATA_").from_env::<Config>() {
        Ok(config) => config,
        Err(error) => panic!("{}", error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_without_env() {
        let config = config();
        assert_eq!(config.backend, "local");
        assert!(config.deadlock_timeout > 0.0);
        assert!(config.threads >= 1);
    }
}
