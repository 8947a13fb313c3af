use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub session_file: PathBuf,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            session_file: default_session_file(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api_url: std::env::var("RECRUITER_API_URL")
                .or_else(|_| std::env::var("RECRUITER_BACKEND_URL"))
                .or_else(|_| Ok::<_, anyhow::Error>(DEFAULT_API_URL.to_string()))
                .and_then(validate_api_url)?,
            session_file: std::env::var("RECRUITER_SESSION_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_session_file),
            poll_interval: secs_from_env("RECRUITER_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            poll_timeout: secs_from_env("RECRUITER_POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT_SECS)?,
            request_timeout: secs_from_env(
                "RECRUITER_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
        };

        if config.poll_timeout < config.poll_interval {
            anyhow::bail!("RECRUITER_POLL_TIMEOUT_SECS must not be shorter than the poll interval");
        }

        tracing::debug!("Recruiter API URL: {}", config.api_url);
        tracing::debug!("Session file: {}", config.session_file.display());
        tracing::debug!(
            "Polling every {:?}, giving up after {:?}",
            config.poll_interval,
            config.poll_timeout
        );

        Ok(config)
    }

    /// Replaces the API URL after checking its scheme.
    pub fn with_api_url(mut self, url: impl Into<String>) -> anyhow::Result<Self> {
        self.api_url = validate_api_url(url.into())?;
        Ok(self)
    }
}

/// `~/.recruiter/session.json`, or a relative path when no home dir exists.
pub fn default_session_file() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".recruiter"))
        .unwrap_or_else(|| PathBuf::from(".recruiter"))
        .join("session.json")
}

fn secs_from_env(key: &str, default: u64) -> anyhow::Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a whole number of seconds", key))?;
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", key);
            }
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

/// Normalises a backend base URL: trims trailing slashes and requires http(s).
pub fn validate_api_url(raw: String) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        anyhow::bail!("RECRUITER_API_URL cannot be empty");
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        anyhow::bail!("RECRUITER_API_URL must start with http:// or https://");
    }
    url::Url::parse(&trimmed)
        .map_err(|e| anyhow::anyhow!("RECRUITER_API_URL is not a valid URL: {}", e))?;
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_poll_contract() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.poll_timeout, Duration::from_secs(120));
        assert!(config.session_file.ends_with("session.json"));
    }

    #[test]
    fn test_with_api_url_trims_trailing_slash() {
        let config = Config::default()
            .with_api_url("https://recruiter.example.com/")
            .unwrap();
        assert_eq!(config.api_url, "https://recruiter.example.com");
    }

    #[test]
    fn test_with_api_url_rejects_other_schemes() {
        assert!(Config::default().with_api_url("ftp://example.com").is_err());
        assert!(Config::default().with_api_url("   ").is_err());
    }
}
