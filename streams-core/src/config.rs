use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::Error;
use crate::Result;
use crate::metrics::Monitor;

const ENV_NAME: &str = "STREAMS_NAME";
const ENV_BUFFER_SIZE: &str = "STREAMS_BUFFER_SIZE";
const ENV_TIMEOUT_MS: &str = "STREAMS_TIMEOUT_MS";
const ENV_FLUSH_ON_CLOSE: &str = "STREAMS_FLUSH_ON_CLOSE";
const ENV_CHANNEL_CAPACITY: &str = "STREAMS_CHANNEL_CAPACITY";

const DEFAULT_NAME: &str = "root";
const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_TIMEOUT_MILLIS: u64 = 1000;
const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Options of a stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Name of the root node of the topology.
    pub name: String,
    /// The sink flushes once more than this many messages are buffered.
    pub buffer_size: usize,
    /// The sink flushes at least this often. Zero disables the time trigger.
    pub timeout: Duration,
    /// Whether the sink flushes what is left in its buffer when its input closes cleanly. When
    /// disabled, the leftover is dropped unmarked and re-delivered by the source after restart.
    pub flush_on_close: bool,
    /// Capacity of the channels between the stages.
    pub channel_capacity: usize,
    pub monitor: Option<Monitor>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            name: DEFAULT_NAME.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MILLIS),
            flush_on_close: true,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            monitor: None,
        }
    }
}

impl StreamConfig {
    /// Defaults overlaid with the `STREAMS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::load(|key| env::var(key).ok())
    }

    fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = StreamConfig::default();

        if let Some(name) = lookup(ENV_NAME) {
            config.name = name;
        }
        if let Some(size) = lookup(ENV_BUFFER_SIZE) {
            config.buffer_size = parse(ENV_BUFFER_SIZE, &size)?;
        }
        if let Some(millis) = lookup(ENV_TIMEOUT_MS) {
            config.timeout = Duration::from_millis(parse(ENV_TIMEOUT_MS, &millis)?);
        }
        if let Some(flush) = lookup(ENV_FLUSH_ON_CLOSE) {
            config.flush_on_close = parse(ENV_FLUSH_ON_CLOSE, &flush)?;
        }
        if let Some(capacity) = lookup(ENV_CHANNEL_CAPACITY) {
            config.channel_capacity = parse(ENV_CHANNEL_CAPACITY, &capacity)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::Config(
                "channel capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid value {value:?} for {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.name, "root");
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert!(config.flush_on_close);
        assert_eq!(config.channel_capacity, 1);
        assert!(config.monitor.is_none());
    }

    #[test]
    fn test_load_overrides() {
        let config = StreamConfig::load(lookup(&[
            (ENV_NAME, "orders"),
            (ENV_BUFFER_SIZE, "10"),
            (ENV_TIMEOUT_MS, "0"),
            (ENV_FLUSH_ON_CLOSE, "false"),
            (ENV_CHANNEL_CAPACITY, "4"),
        ]))
        .unwrap();

        assert_eq!(config.name, "orders");
        assert_eq!(config.buffer_size, 10);
        assert_eq!(config.timeout, Duration::ZERO);
        assert!(!config.flush_on_close);
        assert_eq!(config.channel_capacity, 4);
    }

    #[test]
    fn test_load_without_vars() {
        let config = StreamConfig::load(lookup(&[])).unwrap();
        assert_eq!(config.buffer_size, 1000);
    }

    #[test]
    fn test_load_invalid_values() {
        let err = StreamConfig::load(lookup(&[(ENV_BUFFER_SIZE, "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains(ENV_BUFFER_SIZE)));

        let err = StreamConfig::load(lookup(&[(ENV_CHANNEL_CAPACITY, "0")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
