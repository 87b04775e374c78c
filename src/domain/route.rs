//! Canonical route keys for view counting.
//!
//! Callers hand in whatever they have at hand: a full URL copied from the
//! browser, a router path with a trailing slash, or a link carrying a query
//! string or fragment. All of them must land on the same cache entry, so every
//! lookup goes through [`normalize_route`] first.

use std::fmt;

use super::error::DomainError;

const ROOT: &str = "/";

/// An origin-relative, normalized route such as `/posts/hello-world`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutePath(String);

impl RoutePath {
    /// Normalize `raw` into a route key.
    ///
    /// Blank input is rejected; everything else normalizes to some route.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Err(DomainError::validation("route path must not be empty"));
        }
        Ok(Self(normalize_route(raw)))
    }

    /// Route of a blog post identified by its slug.
    pub fn for_post(slug: &str) -> Result<Self, DomainError> {
        let slug = slug.trim().trim_matches('/');
        if slug.is_empty() {
            return Err(DomainError::validation("post slug must not be empty"));
        }
        Self::parse(&format!("/posts/{slug}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoutePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strip scheme and host, query string, fragment, and any trailing run of
/// slashes and whitespace.
///
/// The result always starts with `/`; the site root is `/`. Applying the
/// function twice yields the same string as applying it once.
pub fn normalize_route(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_origin = strip_origin(trimmed);

    let end = without_origin
        .find(['?', '#'])
        .unwrap_or(without_origin.len());
    let path = without_origin[..end].trim_end_matches(|c: char| c == '/' || c.is_whitespace());

    if path.is_empty() {
        return ROOT.to_string();
    }
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn strip_origin(value: &str) -> &str {
    for scheme in ["https://", "http://"] {
        let has_scheme = value
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme));
        if has_scheme {
            let rest = &value[scheme.len()..];
            return match rest.find('/') {
                Some(index) => &rest[index..],
                None => "",
            };
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_spellings_share_one_key() {
        let expected = normalize_route("/a/b");
        assert_eq!(expected, "/a/b");
        for raw in [
            "https://host/a/b/",
            "http://host:8080/a/b",
            "/a/b/",
            "/a/b?x=1",
            "/a/b#frag",
            "/a/b/?x=1#frag",
            "  /a/b  ",
            "a/b",
            "/a/b /",
            "/a/b ?x=1",
        ] {
            assert_eq!(normalize_route(raw), expected, "input `{raw}`");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "",
            "/",
            "//",
            "https://example.com",
            "HTTPS://Example.com/Posts/Hello/",
            "/posts/hello-world/",
            "/a//",
            "?only=query",
            "#only-fragment",
            "/ünïcode/päth/",
            "relative/path?q#f",
            "/a /",
            "/a / /",
            "/a ?x=1",
            "/a\t#frag",
            "https://host/a /",
        ] {
            let once = normalize_route(raw);
            assert_eq!(normalize_route(&once), once, "input `{raw}`");
        }
    }

    #[test]
    fn root_and_bare_host_normalize_to_root() {
        assert_eq!(normalize_route("/"), "/");
        assert_eq!(normalize_route("https://example.com"), "/");
        assert_eq!(normalize_route("https://example.com/"), "/");
        assert_eq!(normalize_route("/?ref=home"), "/");
    }

    #[test]
    fn path_case_is_preserved() {
        assert_eq!(
            normalize_route("https://example.com/Posts/Hello"),
            "/Posts/Hello"
        );
    }

    #[test]
    fn parse_rejects_blank_input() {
        assert!(RoutePath::parse("").is_err());
        assert!(RoutePath::parse("   ").is_err());
        assert_eq!(
            RoutePath::parse("/posts/x/").expect("valid route").as_str(),
            "/posts/x"
        );
    }

    #[test]
    fn post_slugs_map_under_posts() {
        let route = RoutePath::for_post("hello-world").expect("valid slug");
        assert_eq!(route.as_str(), "/posts/hello-world");
        assert_eq!(
            RoutePath::for_post("/bun-api-with-nix-and-kubernetes/")
                .expect("valid slug")
                .as_str(),
            "/posts/bun-api-with-nix-and-kubernetes"
        );
        assert!(RoutePath::for_post(" / ").is_err());
    }
}
