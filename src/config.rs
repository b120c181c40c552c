//! Runtime configuration
//!
//! Defaults suit a local game server. Each value can be overridden from the
//! environment; command line flags in `main` override both.

use std::env;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default gateway bind address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default channel buffer size for store commands
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Default per-connection outbound message buffer
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Gateway bind address (`BULLS_COWS_ADDR`)
    pub addr: String,
    /// Store actor command buffer (`BULLS_COWS_COMMAND_BUFFER`)
    pub command_buffer: usize,
    /// Outbound frames queued per connection (`BULLS_COWS_OUTBOUND_BUFFER`)
    pub outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            addr: lookup("BULLS_COWS_ADDR").unwrap_or(defaults.addr),
            command_buffer: parse_var(&lookup, "BULLS_COWS_COMMAND_BUFFER", defaults.command_buffer)?,
            outbound_buffer: parse_var(&lookup, "BULLS_COWS_OUTBOUND_BUFFER", defaults.outbound_buffer)?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.addr, DEFAULT_ADDR);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BULLS_COWS_ADDR", "0.0.0.0:9000"),
            ("BULLS_COWS_COMMAND_BUFFER", "64"),
        ]))
        .unwrap();
        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.command_buffer, 64);
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
    }

    #[test]
    fn test_bad_number() {
        let err = Config::from_lookup(lookup(&[("BULLS_COWS_OUTBOUND_BUFFER", "lots")])).unwrap_err();
        assert!(err.to_string().contains("BULLS_COWS_OUTBOUND_BUFFER"));
    }
}
