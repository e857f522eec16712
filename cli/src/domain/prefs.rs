//! Session preferences: `key=value` lines reloaded as defaults next run.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::domain::error::ConfigError;
use crate::domain::session::SessionRequest;

/// Keys understood in the preferences file.
pub const PREF_KEYS: &[&str] = &[
    "hours",
    "partition",
    "cpus",
    "ram",
    "gpu",
    "remote_port",
    "local_port",
    "image",
    "version",
];

/// Parsed preferences. Unknown keys and malformed lines are kept out; the
/// file is advisory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// Parse `key=value` lines. Blank lines and `#` comments are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| PREF_KEYS.contains(&k.as_str()))
            .collect();
        Self { values }
    }

    /// Snapshot of a submitted request.
    #[must_use]
    pub fn from_request(request: &SessionRequest) -> Self {
        let values = [
            ("hours", request.hours.to_string()),
            ("partition", request.partition.clone()),
            ("cpus", request.cpus.to_string()),
            ("ram", request.ram_gb.to_string()),
            ("gpu", if request.gpu { "yes" } else { "no" }.to_string()),
            ("remote_port", request.remote_port.to_string()),
            ("local_port", request.local_port.to_string()),
            ("image", request.image.clone()),
            ("version", request.version.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { values }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay the stored values onto `request`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first value that does
    /// not parse for its field.
    pub fn apply(&self, request: &mut SessionRequest) -> Result<()> {
        for (key, value) in &self.values {
            match key.as_str() {
                "hours" => request.hours = parse_num(key, value)?,
                "partition" => request.partition.clone_from(value),
                "cpus" => request.cpus = parse_num(key, value)?,
                "ram" => request.ram_gb = parse_num(key, value)?,
                "gpu" => request.gpu = parse_flag(key, value)?,
                "remote_port" => request.remote_port = parse_num(key, value)?,
                "local_port" => request.local_port = parse_num(key, value)?,
                "image" => request.image.clone_from(value),
                "version" => request.version.clone_from(value),
                other => return Err(ConfigError::UnknownPreference(other.to_string()).into()),
            }
        }
        Ok(())
    }

    /// Render as `key=value` lines in key order.
    #[must_use]
    pub fn render(&self) -> String {
        self.values.iter().fold(String::new(), |mut out, (k, v)| {
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push('\n');
            out
        })
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            hint: "Expected a number.".to_string(),
        }
        .into()
    })
}

/// Parse a yes/no style flag.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for anything but yes/no, true/false,
/// on/off, 1/0.
pub fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "on" | "1" => Ok(true),
        "no" | "n" | "false" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            hint: "Expected yes or no.".to_string(),
        }
        .into()),
    }
}
