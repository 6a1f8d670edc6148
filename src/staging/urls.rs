//! URL plumbing shared by the access point implementations.
//!
//! Staging locations are plain strings (`http://host/dav/...`,
//! `file:///cache/...`). The helpers here keep the slash handling and the
//! parent/child checks in one place instead of scattering string logic.

use std::path::{Path, PathBuf};

/// Minimal well-formedness check: `scheme://authority-or-path`, with a
/// scheme that starts alphabetic.
pub fn is_well_formed(url: &str) -> bool {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
                && !rest.is_empty()
        }
        None => false,
    }
}

/// Base locations are always handled with a trailing separator so child
/// checks cannot match sibling prefixes (`/cache/a` vs `/cache/ab`).
pub fn ensure_trailing_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

/// Append a relative segment to a base URL or path string.
pub fn append(base: &str, segment: &str) -> String {
    format!("{}{}", ensure_trailing_slash(base), segment.trim_start_matches('/'))
}

/// Relative part of `url` below `base`, or `None` if `url` is not a
/// descendant. Traversal segments in the relative part are rejected.
pub fn relative_to(base: &str, url: &str) -> Option<String> {
    let base = ensure_trailing_slash(base);
    let relative = url.strip_prefix(&base)?;
    if relative.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(relative.to_string())
}

/// Resolve a locator to a local filesystem path. Accepts `file:` URLs and
/// plain paths; any other scheme has no local representation.
pub fn path_from_locator(locator: &str) -> Option<PathBuf> {
    if let Some(rest) = locator.strip_prefix("file://") {
        // file:///cache/x keeps its leading slash, file://host/x is not local
        return rest.starts_with('/').then(|| PathBuf::from(rest));
    }
    if is_well_formed(locator) {
        return None;
    }
    Some(PathBuf::from(locator))
}

/// `file:` URL for an absolute local path.
pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_urls() {
        assert!(is_well_formed("http://localhost/webdav/"));
        assert!(is_well_formed("file:///cache/staging"));
        assert!(is_well_formed("webdav+https://host/base"));
        assert!(!is_well_formed("not a url"));
        assert!(!is_well_formed("://missing-scheme"));
        assert!(!is_well_formed("http://"));
        assert!(!is_well_formed("/local/path/only"));
    }

    #[test]
    fn trailing_slash_is_idempotent() {
        assert_eq!(ensure_trailing_slash("http://h/base"), "http://h/base/");
        assert_eq!(ensure_trailing_slash("http://h/base/"), "http://h/base/");
    }

    #[test]
    fn append_segments() {
        assert_eq!(append("http://h/base", "alice/42/"), "http://h/base/alice/42/");
        assert_eq!(append("http://h/base/", "/alice/42/"), "http://h/base/alice/42/");
    }

    #[test]
    fn relative_child() {
        assert_eq!(
            relative_to("http://h/base/", "http://h/base/alice/42/"),
            Some("alice/42/".to_string())
        );
        assert_eq!(relative_to("http://h/base", "http://h/base/x"), Some("x".to_string()));
    }

    #[test]
    fn relative_rejects_foreign_and_traversal() {
        assert_eq!(relative_to("http://h/base/", "http://other/base/x"), None);
        assert_eq!(relative_to("http://h/base/", "http://h/elsewhere/x"), None);
        assert_eq!(relative_to("http://h/base/", "http://h/base/../etc/x"), None);
        // sibling prefix must not match
        assert_eq!(relative_to("http://h/base", "http://h/base2/x"), None);
    }

    #[test]
    fn locator_resolution() {
        assert_eq!(
            path_from_locator("file:///cache/dav/alice"),
            Some(PathBuf::from("/cache/dav/alice"))
        );
        assert_eq!(path_from_locator("/cache/dav/alice"), Some(PathBuf::from("/cache/dav/alice")));
        assert_eq!(path_from_locator("http://h/dav/alice"), None);
        assert_eq!(path_from_locator("file://remotehost/share"), None);
    }

    #[test]
    fn file_url_of_path() {
        assert_eq!(file_url(Path::new("/cache/dav/42")), "file:///cache/dav/42");
    }
}
