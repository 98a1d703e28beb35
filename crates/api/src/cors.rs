//! CORS handling for browser clients.
//!
//! Every response carries the CORS headers. Preflight (`OPTIONS`) requests are
//! answered here with `200 ok` and never reach a route.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
pub const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
pub const MAX_AGE_SECS: &str = "3600";

const DEV_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:3001",
    "https://localhost:3000",
    "https://localhost:3001",
];

/// Origin allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    allowed: Vec<String>,
    /// When set, unknown origins get no `Access-Control-Allow-Origin` at all.
    strict: bool,
}

impl CorsPolicy {
    pub fn new(frontend_url: Option<&str>, strict: bool) -> Self {
        let mut allowed: Vec<String> = DEV_ORIGINS.iter().map(|o| o.to_string()).collect();
        if let Some(url) = frontend_url.map(|u| u.trim().trim_end_matches('/')) {
            if !url.is_empty() && !allowed.iter().any(|o| o == url) {
                allowed.push(url.to_string());
            }
        }
        Self { allowed, strict }
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed
    }

    /// Value for `Access-Control-Allow-Origin` given the request's `Origin`.
    ///
    /// Listed origins are echoed. Anything else gets the first dev origin,
    /// or nothing in strict mode.
    pub fn allow_origin<'a>(&'a self, origin: Option<&'a str>) -> Option<&'a str> {
        match origin {
            Some(origin) if self.allowed.iter().any(|o| o == origin) => Some(origin),
            _ if self.strict => None,
            _ => Some(DEV_ORIGINS[0]),
        }
    }

    fn apply(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        if let Some(value) = self
            .allow_origin(origin)
            .and_then(|o| HeaderValue::from_str(o).ok())
        {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
        headers.append(header::VARY, HeaderValue::from_static("origin"));
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::new(None, false)
    }
}

pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut response = if req.method() == Method::OPTIONS {
        (StatusCode::OK, "ok").into_response()
    } else {
        next.run(req).await
    };

    policy.apply(origin.as_deref(), response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_origins_are_echoed() {
        let policy = CorsPolicy::new(Some("https://app.example.com/"), false);
        assert_eq!(policy.allow_origin(Some("http://localhost:3001")), Some("http://localhost:3001"));
        assert_eq!(
            policy.allow_origin(Some("https://app.example.com")),
            Some("https://app.example.com")
        );
    }

    #[test]
    fn unknown_origins_fall_back_unless_strict() {
        let lenient = CorsPolicy::default();
        assert_eq!(lenient.allow_origin(Some("https://evil.example")), Some("http://localhost:3000"));
        assert_eq!(lenient.allow_origin(None), Some("http://localhost:3000"));

        let strict = CorsPolicy::new(None, true);
        assert_eq!(strict.allow_origin(Some("https://evil.example")), None);
        assert_eq!(strict.allow_origin(Some("https://localhost:3000")), Some("https://localhost:3000"));
    }

    #[test]
    fn frontend_url_is_not_duplicated() {
        let policy = CorsPolicy::new(Some("http://localhost:3000"), false);
        assert_eq!(policy.allowed_origins().len(), 4);
    }

    #[test]
    fn applies_fixed_headers() {
        let mut headers = HeaderMap::new();
        CorsPolicy::default().apply(Some("http://localhost:3000"), &mut headers);

        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], ALLOWED_METHODS);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], ALLOWED_HEADERS);
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "3600");
    }
}
