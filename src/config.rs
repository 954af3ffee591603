use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::Config;

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub const DEFAULT_BACKEND_URL: &str = "http://prometheus:9090";
const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_QUERY_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_CYCLE_DEADLINE_SECONDS: u64 = 30;
const DEFAULT_HISTORY_LIMIT: usize = 16;
const DEFAULT_MAX_FAILED_CYCLES: u32 = 3;

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let metrics_backend_url = env
        .get_var("METRICS_BACKEND_URL")
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    if !metrics_backend_url.starts_with("http://") && !metrics_backend_url.starts_with("https://") {
        return Err(anyhow!(
            "METRICS_BACKEND_URL must be an http(s) URL, got {:?}",
            metrics_backend_url
        ));
    }
    let metrics_backend_url = metrics_backend_url.trim_end_matches('/').to_string();

    let poll_interval = duration_var(env, "POLL_INTERVAL_SECONDS", DEFAULT_POLL_INTERVAL_SECONDS);
    let query_timeout = duration_var(env, "QUERY_TIMEOUT_SECONDS", DEFAULT_QUERY_TIMEOUT_SECONDS);
    let cycle_deadline = duration_var(env, "CYCLE_DEADLINE_SECONDS", DEFAULT_CYCLE_DEADLINE_SECONDS);

    let cluster_config_path = env
        .get_var("CLUSTER_CONFIG_PATH")
        .filter(|p| !p.trim().is_empty());

    let history_limit = env
        .get_var("HISTORY_LIMIT")
        .and_then(|v| v.trim().parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    let max_failed_cycles = env
        .get_var("MAX_FAILED_CYCLES")
        .and_then(|v| v.trim().parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_MAX_FAILED_CYCLES);

    Ok(Config {
        metrics_backend_url,
        poll_interval,
        query_timeout,
        cycle_deadline,
        cluster_config_path,
        history_limit,
        max_failed_cycles,
    })
}

fn duration_var<E: EnvironmentProvider>(env: &E, key: &str, default_seconds: u64) -> Duration {
    let seconds = env
        .get_var(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&s| s > 0)
        .unwrap_or(default_seconds);
    Duration::from_secs(seconds)
}
