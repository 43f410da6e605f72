mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

use tagforged_common::Error;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./tagforged.toml", "~/.config/tagforged/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {}", path.display());
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.tools.probe_timeout_secs == 0 {
        return Err(Error::config("tools.probe_timeout_secs cannot be 0").into());
    }

    if let Some(path) = &config.tools.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
        }
    }

    let queue = &config.queue;
    if queue.poll_interval_ms == 0 {
        return Err(Error::config("queue.poll_interval_ms cannot be 0").into());
    }
    if !(queue.progress_step.is_finite() && queue.progress_step > 0.0) {
        return Err(Error::config("queue.progress_step must be positive").into());
    }
    if !(queue.progress_ceiling > 0.0 && queue.progress_ceiling < 100.0) {
        return Err(Error::config("queue.progress_ceiling must be between 0 and 100").into());
    }
    if queue.job_timeout_secs == Some(0) {
        return Err(Error::config("queue.job_timeout_secs cannot be 0").into());
    }

    if config.events.channel_capacity == 0 {
        return Err(Error::config("events.channel_capacity cannot be 0").into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        validate_config(&config).unwrap();
        assert_eq!(config.queue.poll_interval_ms, 250);
        assert_eq!(config.queue.history_limit, 1000);
        assert_eq!(config.tools.probe_timeout_secs, 5);
        assert_eq!(config.events.channel_capacity, 256);
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[queue]\npoll_interval_ms = 50\njob_timeout_secs = 600\n\n[tools]\nprobe_timeout_secs = 2"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.queue.poll_interval_ms, 50);
        assert_eq!(config.queue.job_timeout_secs, Some(600));
        assert_eq!(config.queue.progress_ceiling, 95.0);
        assert_eq!(config.tools.probe_timeout_secs, 2);
        assert_eq!(config.events.recent_limit, 100);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.queue.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.queue.progress_ceiling = 100.0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));

        let mut config = Config::default();
        config.queue.progress_step = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.tools.probe_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = load_config_or_default(Some(Path::new("/nonexistent/tagforged.toml")));
        assert!(result.is_err());
    }
}
