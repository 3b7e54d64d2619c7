//! URL normalization applied before matching and caching.

use url::Url;

/// Normalizes a URL into the key used for matching and caching.
///
/// - Absolute `http(s)` URLs are reduced to their path.
/// - Query string and fragment are removed.
/// - Trailing slashes are removed; the root path stays `/`.
///
/// ```
/// use urlgate_core::normalize_url;
///
/// assert_eq!(normalize_url("/clients/elpl/?tab=chat#top"), "/clients/elpl");
/// assert_eq!(normalize_url("https://app.example.com/admin/"), "/admin");
/// assert_eq!(normalize_url("/"), "/");
/// ```
#[must_use]
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();

    let path = if has_http_scheme(trimmed) {
        match Url::parse(trimmed) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => trimmed.to_string(),
        }
    } else {
        trimmed.to_string()
    };

    let end = path.find(['?', '#']).unwrap_or(path.len());
    let mut path = &path[..end];

    while path.len() > 1 && path.ends_with('/') {
        path = &path[..path.len() - 1];
    }

    path.to_string()
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
