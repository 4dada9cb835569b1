//! CORS policy from `[server.cors]`.
//!
//! Entries ending in `:*` match any numeric port on that scheme and host.
//! A lone `"*"` allows every origin without credentials.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use pt_domain::config::CorsConfig;

const METHODS: [Method; 4] = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

pub fn layer(cors: &CorsConfig) -> CorsLayer {
    if matches!(cors.allowed_origins.as_slice(), [only] if only == "*") {
        tracing::warn!("CORS allows every origin");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(METHODS)
            .allow_headers([header::CONTENT_TYPE]);
    }

    let matcher = OriginMatcher::new(&cors.allowed_origins);
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| matcher.allows(origin)))
        .allow_methods(METHODS)
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Exact origins plus `scheme://host:` prefixes for the wildcard-port form.
#[derive(Debug, Clone, Default)]
pub struct OriginMatcher {
    exact: Vec<HeaderValue>,
    any_port: Vec<String>,
}

impl OriginMatcher {
    pub fn new(origins: &[String]) -> Self {
        let mut matcher = Self::default();
        for origin in origins {
            if let Some(prefix) = origin.strip_suffix('*').filter(|p| p.ends_with(':')) {
                matcher.any_port.push(prefix.to_owned());
            } else if let Ok(value) = origin.parse::<HeaderValue>() {
                matcher.exact.push(value);
            } else {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
            }
        }
        matcher
    }

    pub fn allows(&self, origin: &HeaderValue) -> bool {
        if self.exact.iter().any(|e| e == origin) {
            return true;
        }
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        self.any_port.iter().any(|prefix| {
            origin
                .strip_prefix(prefix.as_str())
                .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
        })
    }
}
