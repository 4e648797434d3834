use crate::config::RouteConfig;
use serde::Serialize;

/// Whether a path needs the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    /// Renders without the coordinator
    Optional,
    /// Local development pages
    Local,
    /// Admin pages
    Admin,
    /// Needs a reachable, ready coordinator
    Required,
}

impl RouteClass {
    pub fn requires_coordinator(&self) -> bool {
        matches!(self, RouteClass::Required)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PrefixRule {
    prefix: String,
    class: RouteClass,
}

/// Path prefix table. The longest matching prefix decides the class; paths
/// matching nothing need the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    rules: Vec<PrefixRule>,
}

impl RoutePolicy {
    pub fn new(config: &RouteConfig) -> Self {
        let mut rules: Vec<PrefixRule> = config
            .optional_prefixes
            .iter()
            .map(|prefix| (prefix, RouteClass::Optional))
            .chain(
                config
                    .required_prefixes
                    .iter()
                    .map(|prefix| (prefix, RouteClass::Required)),
            )
            .chain([
                (&config.local_prefix, RouteClass::Local),
                (&config.admin_prefix, RouteClass::Admin),
            ])
            .map(|(prefix, class)| PrefixRule {
                prefix: normalize_path(prefix).to_string(),
                class,
            })
            .collect();

        // Longest first so the first hit is the longest match
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Self { rules }
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        let path = normalize_path(path);

        self.rules
            .iter()
            .find(|rule| prefix_matches(&rule.prefix, path))
            .map(|rule| rule.class)
            .unwrap_or(RouteClass::Required)
    }
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new(&RouteConfig::default())
    }
}

/// Drop query string, fragment and trailing slashes
fn normalize_path(path: &str) -> &str {
    let end = path.find(|c: char| c == '?' || c == '#').unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Prefixes match whole path segments: `/hub` covers `/hub` and `/hub/x`, not `/hubcap`
fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix == "/",
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/hub/"), "/hub");
        assert_eq!(normalize_path("/hub?tab=2"), "/hub");
        assert_eq!(normalize_path("/hub/#top"), "/hub");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_prefix_matches_whole_segments() {
        assert!(prefix_matches("/hub", "/hub"));
        assert!(prefix_matches("/hub", "/hub/competitions"));
        assert!(!prefix_matches("/hub", "/hubcap"));
        assert!(!prefix_matches("/hub", "/"));
    }
}
