use crate::config::types::{Config, CrawlerConfig, OutputConfig, SiteConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound for the politeness delay and backoff settings: one day
const MAX_WAIT_SECS: f64 = 86_400.0;
/// Upper bound for the per-request timeout: one hour
const MAX_TIMEOUT_SECS: f64 = 3_600.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates the target site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", config.base_url, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' has no host",
            config.base_url
        )));
    }

    if !config.start_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "start path must begin with '/', got '{}'",
            config.start_path
        )));
    }

    if config.product_path_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "product_path_marker cannot be empty".to_string(),
        ));
    }

    if config.category_path_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "category_path_marker cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if !(0.0..=MAX_WAIT_SECS).contains(&config.delay_secs) {
        return Err(ConfigError::Validation(format!(
            "delay must be between 0s and {}s, got {}s",
            MAX_WAIT_SECS, config.delay_secs
        )));
    }

    if !(config.timeout_secs > 0.0 && config.timeout_secs <= MAX_TIMEOUT_SECS) {
        return Err(ConfigError::Validation(format!(
            "timeout must be > 0s and <= {}s, got {}s",
            MAX_TIMEOUT_SECS, config.timeout_secs
        )));
    }

    if config.retries < 1 {
        return Err(ConfigError::Validation(
            "retries must be >= 1 (it counts the first attempt)".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if !(0.0..=MAX_WAIT_SECS).contains(&config.backoff_base_secs) {
        return Err(ConfigError::Validation(format!(
            "backoff_base must be between 0s and {}s, got {}s",
            MAX_WAIT_SECS, config.backoff_base_secs
        )));
    }

    if !(config.backoff_base_secs..=MAX_WAIT_SECS).contains(&config.backoff_max_secs) {
        return Err(ConfigError::Validation(format!(
            "backoff_max ({}s) must be >= backoff_base ({}s) and <= {}s",
            config.backoff_max_secs, config.backoff_base_secs, MAX_WAIT_SECS
        )));
    }

    if !(0.0..=1.0).contains(&config.backoff_jitter) {
        return Err(ConfigError::Validation(format!(
            "backoff_jitter must be between 0 and 1, got {}",
            config.backoff_jitter
        )));
    }

    if config.checkpoint_every < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}
