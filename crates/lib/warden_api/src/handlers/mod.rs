//! Request handlers.

pub mod auth;
pub mod permissions;
pub mod roles;

use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use warden_core::models::ClientInfo;

/// Session metadata taken from request headers. The first `X-Forwarded-For`
/// hop wins over `X-Real-IP`.
pub(crate) fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let ip_address = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header("x-real-ip"))
        .map(str::to_string);
    ClientInfo {
        user_agent: header(USER_AGENT.as_str()).map(str::to_string),
        ip_address,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8"));
        let info = client_info(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn missing_headers_leave_fields_empty() {
        assert_eq!(client_info(&HeaderMap::new()), ClientInfo::default());
    }
}
