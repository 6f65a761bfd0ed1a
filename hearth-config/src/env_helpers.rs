use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

pub fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

pub fn optional_parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            reason: "failed to parse".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

pub fn optional_string(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

pub fn optional_secs(name: &'static str, default_secs: f64) -> Result<Duration, ConfigError> {
    let secs: f64 = optional_parsed(name, default_secs)?;
    Ok(Duration::from_secs_f64(secs))
}

pub fn optional_csv(name: &'static str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}
