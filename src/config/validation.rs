use crate::config::types::{ApiConfig, ClassificationConfig, Config, CrawlerConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawler_config(&config.crawler)?;
    validate_classification_config(&config.classification)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates API access configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    validate_http_url("release-url", &config.release_url)?;
    validate_http_url("token-url", &config.token_url)?;

    if config.client_id.is_empty() || config.client_secret.is_empty() {
        return Err(ConfigError::Validation(
            "client-id and client-secret are required (set them in [api] or via ICD_CLIENT_ID / ICD_CLIENT_SECRET)"
                .to_string(),
        ));
    }

    if config.language.is_empty() {
        return Err(ConfigError::Validation(
            "language cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.channel_capacity < 1 {
        return Err(ConfigError::Validation(
            "channel-capacity must be >= 1".to_string(),
        ));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(
            "progress-interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_classification_config(config: &ClassificationConfig) -> Result<(), ConfigError> {
    if config.infectious_keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "infectious-keywords cannot contain empty entries".to_string(),
        ));
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }

    if config.state_path.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "state-path cannot be empty when set".to_string(),
        ));
    }

    if config.state_path.as_deref() == Some(config.path.as_str()) {
        return Err(ConfigError::Validation(
            "state-path must differ from the output path".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn base() -> Config {
        parse_config(
            r#"
[api]
release-url = "https://id.who.int/icd/release/11/2024-01/mms"
client-id = "id"
client-secret = "secret"

[output]
path = "./dump.jsonl"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_base_config() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = base();
        config.api.client_secret.clear();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_bad_release_url() {
        let mut config = base();
        config.api.release_url = "ftp://id.who.int/icd".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.api.release_url = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = base();
        config.crawler.concurrency = 0;
        assert!(validate(&config).is_err());

        config.crawler.concurrency = 65;
        assert!(validate(&config).is_err());

        config.crawler.concurrency = 64;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_max_attempts_bounds() {
        let mut config = base();
        config.crawler.max_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_state_path_must_differ_from_output() {
        let mut config = base();
        config.output.state_path = Some(config.output.path.clone());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_keyword_rejected() {
        let mut config = base();
        config.classification.infectious_keywords.push("  ".to_string());
        assert!(validate(&config).is_err());
    }
}
