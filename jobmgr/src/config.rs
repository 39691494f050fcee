use crate::error::{Error, Result};
use serde::{de, Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SOFT_TIMEOUT_ARGUMENT: &str = "--tlimit";
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_RETENTION_DAYS: u64 = 3;

/// Startup configuration.
///
/// Deserialized from a JSON object with camelCase keys. Numeric values may be
/// given either as JSON numbers or as numeric strings.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Working directory of the external tool.
    pub tool_path: PathBuf,
    /// Root of all job directories.
    pub jobs_directory: PathBuf,
    /// `{0}` is replaced with the job directory, `{1}` with the input file name.
    pub command_template: String,
    #[serde(deserialize_with = "number_or_string")]
    pub max_threads: usize,
    /// Passed verbatim to the tool after `soft_timeout_argument`.
    #[serde(deserialize_with = "string_or_number")]
    pub soft_timeout: String,
    /// Milliseconds.
    #[serde(deserialize_with = "number_or_string")]
    pub hard_timeout: u64,
    #[serde(default = "default_soft_timeout_argument")]
    pub soft_timeout_argument: String,
    #[serde(default)]
    pub arguments_file: Option<PathBuf>,
    #[serde(
        default = "default_janitor_interval_secs",
        deserialize_with = "number_or_string"
    )]
    pub janitor_interval_secs: u64,
    #[serde(
        default = "default_retention_days",
        deserialize_with = "number_or_string"
    )]
    pub retention_days: u64,
}

fn default_soft_timeout_argument() -> String {
    DEFAULT_SOFT_TIMEOUT_ARGUMENT.to_string()
}

fn default_janitor_interval_secs() -> u64 {
    DEFAULT_JANITOR_INTERVAL_SECS
}

fn default_retention_days() -> u64 {
    DEFAULT_RETENTION_DAYS
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn number_or_string<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let n = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n,
        NumberOrString::String(s) => s.trim().parse::<u64>().map_err(de::Error::custom)?,
    };
    T::try_from(n).map_err(|_| de::Error::custom(format!("{} is out of range", n)))
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s,
    })
}

impl Config {
    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| Error::config(format!("cannot read {}: {}", path.display(), err)))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|err| Error::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_template.split_whitespace().next().is_none() {
            return Err(Error::config("commandTemplate is empty"));
        }
        if self.max_threads == 0 {
            return Err(Error::config("maxThreads must be at least 1"));
        }
        if self.hard_timeout == 0 {
            return Err(Error::config("hardTimeout must be greater than 0"));
        }
        if let Ok(soft) = self.soft_timeout.trim().parse::<u64>() {
            if self.hard_timeout <= soft {
                return Err(Error::config(format!(
                    "hardTimeout ({}) must exceed softTimeout ({})",
                    self.hard_timeout, soft
                )));
            }
        }
        if self.soft_timeout_argument.trim().is_empty() {
            return Err(Error::config("softTimeoutArgument is empty"));
        }
        if self.janitor_interval_secs == 0 {
            return Err(Error::config("janitorIntervalSecs must be greater than 0"));
        }
        Ok(())
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_timeout)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }
}
