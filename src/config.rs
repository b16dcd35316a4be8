use std::{env, fmt::Display, str::FromStr, time::Duration};

use dotenvy::dotenv;
use reqwest::Url;
use tracing::{info, warn};

use crate::model::event_link;
pub use crate::model::DEFAULT_ACTIVE_SLOT_SIZE;

pub const DEFAULT_EVENT_ID: &str = "seed-event";
pub const DEFAULT_TIMEOUT_MS: u64 = 8000;
pub const DEFAULT_PUBLIC_URL: &str = "http://127.0.0.1:3000";

/// Process-wide settings, loaded once at startup and handed to server functions via context.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the queue backend, without a trailing slash.
    pub queue_api: String,
    pub event_id: String,
    pub active_slot_size: u32,
    pub timeout: Duration,
    /// Where visitors reach this site. Used for the register QR code on the TV page.
    pub public_url: String,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't need to touch the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let queue_api = lookup("QUEUE_API")
            .map(|base| base.trim().trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty())
            .ok_or_else(|| "QUEUE_API must be set in .env.".to_string())?;

        let event_id = lookup("EVENT_ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| {
                info!("EVENT_ID not set, using default: {DEFAULT_EVENT_ID}");
                DEFAULT_EVENT_ID.to_string()
            });

        let active_slot_size = parse_or(
            "ACTIVE_SLOT_SIZE",
            lookup("ACTIVE_SLOT_SIZE"),
            DEFAULT_ACTIVE_SLOT_SIZE,
        )
        .max(1);
        let timeout_ms = parse_or(
            "QUEUE_API_TIMEOUT_MS",
            lookup("QUEUE_API_TIMEOUT_MS"),
            DEFAULT_TIMEOUT_MS,
        );
        let timeout_ms = if timeout_ms == 0 {
            warn!("QUEUE_API_TIMEOUT_MS must be above zero, using default: {DEFAULT_TIMEOUT_MS}");
            DEFAULT_TIMEOUT_MS
        } else {
            timeout_ms
        };

        let public_url = lookup("PUBLIC_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());

        Ok(Config {
            queue_api,
            event_id,
            active_slot_size,
            timeout: Duration::from_millis(timeout_ms),
            public_url,
        })
    }

    /// The event a request is about: the `?event=` override when present, else the default.
    pub fn event_id(&self, requested: Option<String>) -> String {
        requested
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.event_id.clone())
    }

    pub fn register_url(&self, event_id: &str) -> String {
        match Url::parse(&self.public_url) {
            Ok(mut url) if !url.cannot_be_a_base() => {
                if let Ok(mut path) = url.path_segments_mut() {
                    path.pop_if_empty().push("register");
                }
                url.query_pairs_mut().append_pair("event", event_id);
                url.to_string()
            }
            _ => event_link(&format!("{}/register", self.public_url), event_id),
        }
    }
}

fn parse_or<T: FromStr + Display>(key: &str, raw: Option<String>, default: T) -> T
where
    T::Err: Display,
{
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("QUEUE_API", "https://queue.example.com//")]))
            .unwrap();
        assert_eq!(config.queue_api, "https://queue.example.com");
        assert_eq!(config.event_id, DEFAULT_EVENT_ID);
        assert_eq!(config.active_slot_size, DEFAULT_ACTIVE_SLOT_SIZE);
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(config.public_url, DEFAULT_PUBLIC_URL);
    }

    #[test]
    fn test_missing_base_url() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("QUEUE_API", "  ")])).is_err());
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let config = Config::from_lookup(lookup(&[
            ("QUEUE_API", "http://localhost:4000"),
            ("EVENT_ID", "ana-jkt"),
            ("ACTIVE_SLOT_SIZE", "five"),
            ("QUEUE_API_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();
        assert_eq!(config.event_id, "ana-jkt");
        assert_eq!(config.active_slot_size, DEFAULT_ACTIVE_SLOT_SIZE);
        assert_eq!(config.timeout, Duration::from_millis(1500));

        let config = Config::from_lookup(lookup(&[
            ("QUEUE_API", "http://localhost:4000"),
            ("ACTIVE_SLOT_SIZE", "0"),
        ]))
        .unwrap();
        assert_eq!(config.active_slot_size, 1);
    }

    #[test]
    fn test_event_id_override() {
        let config =
            Config::from_lookup(lookup(&[("QUEUE_API", "http://localhost:4000")])).unwrap();
        assert_eq!(config.event_id(None), DEFAULT_EVENT_ID);
        assert_eq!(config.event_id(Some("  ".to_string())), DEFAULT_EVENT_ID);
        assert_eq!(config.event_id(Some("ana-sby".to_string())), "ana-sby");
    }

    #[test]
    fn test_register_url() {
        let config = Config::from_lookup(lookup(&[
            ("QUEUE_API", "http://localhost:4000"),
            ("PUBLIC_URL", "https://ana.example.com/"),
        ]))
        .unwrap();
        assert_eq!(
            config.register_url("ana-jkt"),
            "https://ana.example.com/register?event=ana-jkt"
        );

        let url = config.register_url("ana jkt&day=2");
        assert_eq!(url, "https://ana.example.com/register?event=ana+jkt%26day%3D2");
        assert!(!url.contains("&day=2"));

        let config = Config::from_lookup(lookup(&[
            ("QUEUE_API", "http://localhost:4000"),
            ("PUBLIC_URL", "https://example.com/ana/"),
        ]))
        .unwrap();
        assert_eq!(
            config.register_url("a#b"),
            "https://example.com/ana/register?event=a%23b"
        );
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = Config::from_lookup(lookup(&[
            ("QUEUE_API", "http://localhost:4000"),
            ("QUEUE_API_TIMEOUT_MS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }
}
