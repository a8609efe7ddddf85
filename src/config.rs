use std::{env, str::FromStr};
use thiserror::Error;

use crate::default_struct;

/// Upper bound for `WARDEN_MAX_DURATION_SECS`: one week.
pub const DURATION_CEILING_SECS: u64 = 7 * 86_400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

default_struct! {
#[derive(Debug, Clone)]
pub struct ConfinementSettings {
    /// Name of the voice channel confined members are held in.
    pub holding_channel: String = "禁閉室".to_string(),
    pub default_duration_secs: u64 = 60,
    pub max_duration_secs: u64 = 86_400,
}
}

default_struct! {
#[derive(Debug, Clone)]
pub struct PresenceSettings {
    pub retention_hours: i64 = 12,
    /// Offset applied when rendering timestamps for humans.
    pub utc_offset_hours: i32 = 8,
}
}

default_struct! {
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub prefix: String = "!".to_string(),
    pub data_dir: String = "data".to_string(),
    pub port: u16 = 8081,
    pub confinement: ConfinementSettings,
    pub presence: PresenceSettings,
}
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config {
            token: env::var("DISCORD_TOKEN").map_err(|_| ConfigError::Missing("DISCORD_TOKEN"))?,
            ..Default::default()
        };

        if let Some(prefix) = optional("WARDEN_PREFIX") {
            config.prefix = prefix;
        }
        if let Some(dir) = optional("WARDEN_DATA_DIR") {
            config.data_dir = dir;
        }
        if let Some(name) = optional("WARDEN_HOLDING_CHANNEL") {
            config.confinement.holding_channel = name;
        }
        if let Some(port) = parsed("PORT")? {
            config.port = port;
        }
        if let Some(secs) = parsed("WARDEN_DEFAULT_DURATION_SECS")? {
            config.confinement.default_duration_secs = secs;
        }
        if let Some(secs) = parsed("WARDEN_MAX_DURATION_SECS")? {
            config.confinement.max_duration_secs = secs;
        }
        if let Some(hours) = parsed("WARDEN_RETENTION_HOURS")? {
            config.presence.retention_hours = hours;
        }
        if let Some(offset) = parsed("WARDEN_UTC_OFFSET_HOURS")? {
            config.presence.utc_offset_hours = offset;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.confinement;
        if c.max_duration_secs > DURATION_CEILING_SECS {
            return Err(ConfigError::Invalid {
                key: "WARDEN_MAX_DURATION_SECS",
                value: c.max_duration_secs.to_string(),
            });
        }
        if c.default_duration_secs == 0 || c.default_duration_secs > c.max_duration_secs {
            return Err(ConfigError::Invalid {
                key: "WARDEN_DEFAULT_DURATION_SECS",
                value: c.default_duration_secs.to_string(),
            });
        }
        if self.presence.retention_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "WARDEN_RETENTION_HOURS",
                value: self.presence.retention_hours.to_string(),
            });
        }
        if !(-23..=23).contains(&self.presence.utc_offset_hours) {
            return Err(ConfigError::Invalid {
                key: "WARDEN_UTC_OFFSET_HOURS",
                value: self.presence.utc_offset_hours.to_string(),
            });
        }
        Ok(())
    }

    pub fn allow_list_path(&self) -> String {
        format!("{}/allowlist.db", self.data_dir.trim_end_matches('/'))
    }
}

fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.prefix, "!");
        assert_eq!(config.port, 8081);
        assert_eq!(config.confinement.default_duration_secs, 60);
        assert_eq!(config.presence.retention_hours, 12);
        assert_eq!(config.presence.utc_offset_hours, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_default_duration_above_max() {
        let mut config = Config::default();
        config.confinement.default_duration_secs = 120;
        config.confinement.max_duration_secs = 60;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "WARDEN_DEFAULT_DURATION_SECS", .. })
        ));
    }

    #[test]
    fn rejects_max_duration_beyond_a_week() {
        let mut config = Config::default();
        config.confinement.max_duration_secs = DURATION_CEILING_SECS;
        assert!(config.validate().is_ok());

        config.confinement.max_duration_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "WARDEN_MAX_DURATION_SECS", .. })
        ));
    }

    #[test]
    fn allow_list_path_joins_data_dir() {
        let config = Config {
            data_dir: "state/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.allow_list_path(), "state/allowlist.db");
    }
}
