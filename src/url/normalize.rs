use crate::UrlError;
use url::Url;

/// Normalizes an entity URL so that cosmetic variants share one frontier key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an http or https scheme and a host
/// 3. Upgrade http:// to https:// when `force_https` is set
/// 4. Lowercase the host
/// 5. Remove a trailing slash from the path (except for root /)
/// 6. Remove the fragment
///
/// The API publishes its `child` and `parent` references with the `http`
/// scheme while serving them over `https`; the query string is kept as-is
/// because release URLs carry no tracking parameters.
///
/// # Examples
///
/// ```
/// use icd_harvester::url::normalize_entity_url;
///
/// let url = normalize_entity_url("http://ID.WHO.INT/icd/entity/1435254666/", true).unwrap();
/// assert_eq!(url, "https://id.who.int/icd/entity/1435254666");
/// ```
pub fn normalize_entity_url(url_str: &str, force_https: bool) -> Result<String, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url, force_https)
}

/// Resolves a possibly relative reference against the URL it was found on,
/// then normalizes it
pub fn resolve_entity_url(
    base: &str,
    reference: &str,
    force_https: bool,
) -> Result<String, UrlError> {
    let reference = reference.trim();
    match Url::parse(reference) {
        Ok(url) => normalize_parsed(url, force_https),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(base).map_err(|e| UrlError::Parse(e.to_string()))?;
            let joined = base
                .join(reference)
                .map_err(|e| UrlError::Parse(e.to_string()))?;
            normalize_parsed(joined, force_https)
        }
        Err(e) => Err(UrlError::Parse(e.to_string())),
    }
}

fn normalize_parsed(mut url: Url, force_https: bool) -> Result<String, UrlError> {
    match url.scheme() {
        "https" => {}
        "http" if force_https => {
            url.set_scheme("https")
                .map_err(|_| UrlError::InvalidScheme("cannot upgrade to https".to_string()))?;
        }
        "http" => {}
        other => {
            return Err(UrlError::InvalidScheme(format!(
                "Only HTTP and HTTPS schemes are supported, got: {}",
                other
            )))
        }
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.set_fragment(None);

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_upgraded_when_forced() {
        let result = normalize_entity_url("http://id.who.int/icd/entity/1", true).unwrap();
        assert_eq!(result, "https://id.who.int/icd/entity/1");
    }

    #[test]
    fn test_http_kept_when_not_forced() {
        let result = normalize_entity_url("http://127.0.0.1:8080/mms/1", false).unwrap();
        assert_eq!(result, "http://127.0.0.1:8080/mms/1");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_entity_url("https://id.who.int/icd/entity/1/", true).unwrap();
        assert_eq!(result, "https://id.who.int/icd/entity/1");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = normalize_entity_url("https://id.who.int/", true).unwrap();
        assert_eq!(result, "https://id.who.int/");
    }

    #[test]
    fn test_remove_fragment_and_lowercase_host() {
        let result = normalize_entity_url("https://ID.WHO.int/icd/Entity/1#top", true).unwrap();
        assert_eq!(result, "https://id.who.int/icd/Entity/1");
    }

    #[test]
    fn test_query_preserved() {
        let result =
            normalize_entity_url("https://id.who.int/icd/release/11/mms?include=ancestor", true)
                .unwrap();
        assert_eq!(result, "https://id.who.int/icd/release/11/mms?include=ancestor");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_entity_url("ftp://id.who.int/icd", true);
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_entity_url("not a url", true).is_err());
    }

    #[test]
    fn test_resolve_relative_reference() {
        let result =
            resolve_entity_url("http://127.0.0.1:9000/mms/root", "/mms/child", false).unwrap();
        assert_eq!(result, "http://127.0.0.1:9000/mms/child");
    }

    #[test]
    fn test_resolve_absolute_reference_ignores_base() {
        let result = resolve_entity_url(
            "https://example.com/a",
            "http://id.who.int/icd/entity/2/",
            true,
        )
        .unwrap();
        assert_eq!(result, "https://id.who.int/icd/entity/2");
    }
}
