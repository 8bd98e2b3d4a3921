//! Small helpers shared by plugin hooks.

/// Path prefixes that serve static assets.
const STATIC_PREFIXES: &[&str] = &["/static/", "/css/", "/js/", "/images/"];

/// Health check endpoints.
const HEALTH_PATHS: &[&str] = &["/actuator/health", "/health", "/api/health"];

/// True when `path` is `prefix` itself or lies below it.
pub fn path_matches(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// True for static assets and health checks, which request-level hooks
/// usually leave alone.
pub fn is_static_path(path: &str) -> bool {
    STATIC_PREFIXES.iter().any(|p| path.starts_with(p)) || HEALTH_PATHS.contains(&path)
}
