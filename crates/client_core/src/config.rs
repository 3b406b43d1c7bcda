use std::{fs, path::Path, time::Duration};

use anyhow::{ensure, Context};
use serde::Deserialize;

use crate::transport::backoff::DEFAULT_RECONNECT_DELAYS_MS;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub hub_url: String,
    pub access_token_cookie: String,
    pub reconnect_delays_ms: Vec<u64>,
    pub join_stagger_ms: u64,
    pub keepalive_interval_ms: u64,
    pub server_timeout_ms: u64,
    /// `0` disables the periodic conversation list refresh.
    pub summary_refresh_interval_ms: u64,
    pub min_search_len: usize,
    pub event_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000/api".into(),
            hub_url: "http://127.0.0.1:5000/chatHub".into(),
            access_token_cookie: "access-token".into(),
            reconnect_delays_ms: DEFAULT_RECONNECT_DELAYS_MS.to_vec(),
            join_stagger_ms: 200,
            keepalive_interval_ms: 15_000,
            server_timeout_ms: 30_000,
            summary_refresh_interval_ms: 30_000,
            min_search_len: 2,
            event_buffer: 1024,
        }
    }
}

impl ClientSettings {
    pub fn join_stagger(&self) -> Duration {
        Duration::from_millis(self.join_stagger_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms.max(1))
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms.max(1))
    }

    pub fn summary_refresh_interval(&self) -> Option<Duration> {
        (self.summary_refresh_interval_ms > 0)
            .then(|| Duration::from_millis(self.summary_refresh_interval_ms))
    }
}

/// Defaults, then the optional TOML file, then environment overrides.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<ClientSettings> {
    let mut settings = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => ClientSettings::default(),
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    validate(&settings)?;
    Ok(settings)
}

/// The reconnect schedule needs a non-zero last step, since it repeats forever.
fn validate(settings: &ClientSettings) -> anyhow::Result<()> {
    ensure!(
        !settings.reconnect_delays_ms.is_empty(),
        "reconnect_delays_ms must list at least one delay"
    );
    ensure!(
        settings.reconnect_delays_ms.last().is_some_and(|last| *last > 0),
        "the last reconnect delay must be greater than zero: {:?}",
        settings.reconnect_delays_ms
    );
    ensure!(!settings.api_base_url.trim().is_empty(), "api_base_url is empty");
    ensure!(!settings.hub_url.trim().is_empty(), "hub_url is empty");
    Ok(())
}

fn apply_env_overrides(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("CHAT_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("CHAT_HUB_URL") {
        settings.hub_url = v;
    }
    if let Some(v) = lookup("APP__HUB_URL") {
        settings.hub_url = v;
    }

    if let Some(v) = lookup("APP__JOIN_STAGGER_MS") {
        settings.join_stagger_ms = v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("APP__JOIN_STAGGER_MS is not a number: {v}"))?;
    }

    if let Some(v) = lookup("APP__RECONNECT_DELAYS_MS") {
        settings.reconnect_delays_ms = v
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("APP__RECONNECT_DELAYS_MS is not a comma list: {v}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn file_values_override_defaults_field_by_field() {
        let parsed: ClientSettings = toml::from_str(
            r#"
            api_base_url = "https://chat.example.com/api"
            reconnect_delays_ms = [0, 1000]
            "#,
        )
        .expect("toml");
        assert_eq!(parsed.api_base_url, "https://chat.example.com/api");
        assert_eq!(parsed.reconnect_delays_ms, vec![0, 1000]);
        assert_eq!(parsed.access_token_cookie, "access-token");
        assert_eq!(parsed.join_stagger_ms, 200);
    }

    #[test]
    fn app_prefixed_variables_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CHAT_HUB_URL", "ws://legacy/hub"),
            ("APP__HUB_URL", "wss://chat.example.com/chatHub"),
            ("APP__RECONNECT_DELAYS_MS", "0, 500 ,1500"),
            ("APP__JOIN_STAGGER_MS", "50"),
        ]);
        let mut settings = ClientSettings::default();
        apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(settings.hub_url, "wss://chat.example.com/chatHub");
        assert_eq!(settings.reconnect_delays_ms, vec![0, 500, 1500]);
        assert_eq!(settings.join_stagger(), Duration::from_millis(50));
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let mut settings = ClientSettings::default();
        let err = apply_env_overrides(&mut settings, |key| {
            (key == "APP__RECONNECT_DELAYS_MS").then(|| "soon".to_string())
        })
        .expect_err("must fail");
        assert!(err.to_string().contains("APP__RECONNECT_DELAYS_MS"));
    }

    #[test]
    fn reconnect_schedule_must_not_spin() {
        let mut settings = ClientSettings::default();
        apply_env_overrides(&mut settings, |key| {
            (key == "APP__RECONNECT_DELAYS_MS").then(String::new)
        })
        .expect("overrides");
        let err = validate(&settings).expect_err("empty schedule");
        assert!(err.to_string().contains("at least one delay"));

        let parsed: ClientSettings = toml::from_str("reconnect_delays_ms = [500, 0]").expect("toml");
        let err = validate(&parsed).expect_err("zero ceiling");
        assert!(err.to_string().contains("greater than zero"));

        validate(&ClientSettings::default()).expect("defaults are valid");
    }

    #[test]
    fn zero_refresh_interval_disables_polling() {
        let settings = ClientSettings {
            summary_refresh_interval_ms: 0,
            ..ClientSettings::default()
        };
        assert_eq!(settings.summary_refresh_interval(), None);
    }
}
