use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ReformError, Result};
use crate::format::ts::{DemuxConfig, PacketSize};
use crate::reform::ReformConfig;

const ENV_PREFIX: &str = "TSREFORM_";
const CONFIG_PATH: &str = "./tsreform.toml";

/// Commented defaults for every key, also written next to the build output.
pub const TEMPLATE: &str = include_str!("tsreform.template.toml");

const KEYS: [&str; 10] = [
    "packet_size",
    "recording_start_ms",
    "anchor_interval_secs",
    "change_tolerance_secs",
    "max_backward_jump_secs",
    "min_zone_frames",
    "split_cm",
    "bitrate_cm",
    "cost_limit",
    "time_factor",
];

/// Settings of a whole processing run.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub demux: DemuxConfig,
    pub reform: ReformConfig,
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ReformError::Config(format!("not a boolean: {}", value))),
    }
}

impl Config {
    /// Defaults, overridden by `TSREFORM_*` environment variables and then
    /// by `./tsreform.toml` when it exists.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        for key in KEYS {
            if let Ok(value) = env::var(format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())) {
                config.set(key, &value)?;
            }
        }

        if let Ok(mut file) = File::open(CONFIG_PATH) {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            config.apply(&content)?;
        }

        Ok(config)
    }

    /// Sets one key from its textual value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key {
            "packet_size" => {
                self.demux.packet_size = match value {
                    "auto" => PacketSize::Auto,
                    "188" => PacketSize::Fixed(188),
                    "192" => PacketSize::Fixed(192),
                    _ => return Err(ReformError::Config(format!("bad packet size: {}", value))),
                }
            }
            "recording_start_ms" => self.demux.recording_start_ms = value.parse()?,
            "anchor_interval_secs" => self.demux.anchor_interval_secs = value.parse()?,
            "change_tolerance_secs" => self.reform.change_tolerance_secs = value.parse()?,
            "max_backward_jump_secs" => self.reform.max_backward_jump_secs = value.parse()?,
            "min_zone_frames" => self.reform.min_zone_frames = value.parse()?,
            "split_cm" => self.reform.split_cm = parse_bool(value)?,
            "bitrate_cm" => self.reform.bitrate.bitrate_cm = value.parse()?,
            "cost_limit" => self.reform.bitrate.cost_limit = value.parse()?,
            "time_factor" => self.reform.bitrate.time_factor = value.parse()?,
            _ => return Err(ReformError::Config(format!("unknown key: {}", key))),
        }
        Ok(())
    }

    fn apply(&mut self, content: &str) -> Result<()> {
        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ReformError::Config(format!("expected key = value: {}", line)));
            };
            self.set(key.trim(), value)?;
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ReformError;

    fn from_str(s: &str) -> Result<Self> {
        let mut config = Config::default();
        config.apply(s)?;
        Ok(config)
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        std::fs::write(path, TEMPLATE)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_str() {
        let config: Config = "packet_size = 192\nsplit_cm = yes # trailing\n\ncost_limit = \"0.2\"\nmin_zone_frames=12"
            .parse()
            .unwrap();
        assert_eq!(config.demux.packet_size, PacketSize::Fixed(192));
        assert!(config.reform.split_cm);
        assert_eq!(config.reform.bitrate.cost_limit, 0.2);
        assert_eq!(config.reform.min_zone_frames, 12);
        assert_eq!(config.reform.change_tolerance_secs, 3.0);
    }

    #[test]
    fn test_bad_values() {
        assert!(matches!("packet_size = 204".parse::<Config>(), Err(ReformError::Config(_))));
        assert!(matches!("min_zone_frames = x".parse::<Config>(), Err(ReformError::ParseInt(_))));
        assert!(matches!("time_factor = fast".parse::<Config>(), Err(ReformError::ParseFloat(_))));
        assert!(matches!("colour = red".parse::<Config>(), Err(ReformError::Config(_))));
        assert!(matches!("no equals sign".parse::<Config>(), Err(ReformError::Config(_))));
    }

    #[test]
    fn test_template_parses() {
        let dir = env::temp_dir().join(format!("tsreform-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tsreform.toml");
        let _ = std::fs::remove_file(&path);
        create_default_config_template(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let config: Config = content.parse().unwrap();
        assert_eq!(config.reform, ReformConfig::default());
        assert_eq!(config.demux.packet_size, PacketSize::Auto);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_template_lists_every_key() {
        let keys: Vec<&str> = TEMPLATE
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, _)| key.trim())
            .filter(|key| !key.starts_with('#'))
            .collect();
        assert_eq!(keys, KEYS.to_vec());
    }
}
