//! The `user` cookie that marks a browser as signed in.
//!
//! The cookie holds the login name, percent-encoded, and lives for one
//! hour. It is `HttpOnly` and scoped to the whole site.

use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};

/// Name of the identity cookie.
pub const USER_COOKIE: &str = "user";

/// Lifetime of the identity cookie in seconds.
pub const USER_COOKIE_MAX_AGE: u64 = 3600;

/// Signed-in user, placed in request extensions by the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
}

/// The login name carried by the `user` cookie, if present and non-empty.
#[must_use]
pub fn user_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == USER_COOKIE)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value that signs `user` in.
#[must_use]
pub fn login_cookie(user: &str, domain: Option<&str>) -> HeaderValue {
    let mut cookie = format!(
        "{USER_COOKIE}={}; Path=/; Max-Age={USER_COOKIE_MAX_AGE}; HttpOnly; SameSite=Lax",
        urlencoding::encode(user)
    );
    push_domain(&mut cookie, domain);
    to_header(cookie)
}

/// `Set-Cookie` value that removes the identity cookie.
#[must_use]
pub fn logout_cookie(domain: Option<&str>) -> HeaderValue {
    let mut cookie = format!("{USER_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax");
    push_domain(&mut cookie, domain);
    to_header(cookie)
}

fn push_domain(cookie: &mut String, domain: Option<&str>) {
    if let Some(domain) = domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
}

fn to_header(cookie: String) -> HeaderValue {
    // Percent-encoding keeps the value visible ASCII, so this only fails on a
    // misconfigured domain; fall back to a host-only cookie then.
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| {
        let host_only = cookie.split("; Domain=").next().unwrap_or_default();
        HeaderValue::from_str(host_only).unwrap_or_else(|_| HeaderValue::from_static("user=; Max-Age=0"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn headers(cookie: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        h
    }

    #[test]
    fn reads_user_among_other_cookies() {
        assert_eq!(
            user_from_headers(&headers("theme=dark; user=alice; lang=en")),
            Some("alice".to_owned())
        );
    }

    #[test]
    fn missing_or_empty_cookie_is_none() {
        assert_eq!(user_from_headers(&HeaderMap::new()), None);
        assert_eq!(user_from_headers(&headers("user=")), None);
        assert_eq!(user_from_headers(&headers("username=alice")), None);
    }

    #[test]
    fn login_cookie_round_trips_odd_names() {
        let value = login_cookie("a b;c", None);
        let text = value.to_str().unwrap();
        assert!(text.contains("Max-Age=3600"));
        assert!(text.contains("HttpOnly"));
        let pair = text.split(';').next().unwrap();
        assert_eq!(user_from_headers(&headers(pair)), Some("a b;c".to_owned()));
    }

    #[test]
    fn logout_cookie_expires_immediately() {
        let value = logout_cookie(Some("orecast.example"));
        let text = value.to_str().unwrap();
        assert!(text.starts_with("user=;"));
        assert!(text.contains("Max-Age=0"));
        assert!(text.contains("Domain=orecast.example"));
    }

    #[test]
    fn bad_domain_falls_back_to_host_only() {
        let value = login_cookie("alice", Some("bad\ndomain"));
        assert!(!value.to_str().unwrap().contains("Domain"));
    }
}
