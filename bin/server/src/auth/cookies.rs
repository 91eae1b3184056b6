//! Names and attributes of the cookies that carry login and session state.

use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::config::{SecureCookies, SessionConfig};

/// CSRF state for an in-flight login.
pub const STATE_COOKIE: &str = "state";

/// ID token nonce for an in-flight login.
pub const NONCE_COOKIE: &str = "nonce";

/// PKCE code verifier for an in-flight login.
pub const PKCE_VERIFIER_COOKIE: &str = "pkceVerifier";

/// Raw signed ID token of an established session.
pub const ID_TOKEN_COOKIE: &str = "idToken";

/// Refresh token of an established session.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Attributes applied to cookies issued for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieOptions {
    /// Whether to set `Secure`.
    pub secure: bool,
    /// `Max-Age` of the cookie.
    pub ttl: Duration,
}

impl CookieOptions {
    /// Derives cookie attributes from configuration and the request's transport.
    #[must_use]
    pub fn for_request(config: &SessionConfig, headers: &HeaderMap) -> Self {
        let secure = match config.secure_cookies {
            SecureCookies::Always => true,
            SecureCookies::Never => false,
            SecureCookies::Auto => arrived_over_tls(headers),
        };
        Self {
            secure,
            ttl: Duration::seconds(config.cookie_ttl_seconds),
        }
    }
}

/// Returns true if the proxy in front of us reports a TLS connection.
fn arrived_over_tls(headers: &HeaderMap) -> bool {
    let forwarded_proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"));
    if let Some(secure) = forwarded_proto {
        return secure;
    }

    headers
        .get(header::FORWARDED)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split([';', ','])
                .map(str::trim)
                .any(|pair| pair.eq_ignore_ascii_case("proto=https"))
        })
        .unwrap_or(false)
}

/// Builds an `HttpOnly`, site-wide cookie.
#[must_use]
pub fn issue(name: &'static str, value: String, options: CookieOptions) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(options.secure)
        .same_site(SameSite::Lax)
        .max_age(options.ttl)
        .build()
}

/// Deletes `name` from the browser, if the request presented it.
#[must_use]
pub fn forget(jar: CookieJar, name: &'static str) -> CookieJar {
    jar.remove(Cookie::build(name).path("/"))
}

/// Reads a cookie's value, treating an empty value as absent.
#[must_use]
pub fn read(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn auto_follows_forwarded_proto() {
        let config = SessionConfig::default();

        let https = CookieOptions::for_request(&config, &headers("x-forwarded-proto", "https"));
        let http = CookieOptions::for_request(&config, &headers("x-forwarded-proto", "http"));
        let direct = CookieOptions::for_request(&config, &HeaderMap::new());

        assert!(https.secure);
        assert!(!http.secure);
        assert!(!direct.secure);
        assert_eq!(https.ttl, Duration::seconds(3600));
    }

    #[test]
    fn auto_understands_standard_forwarded_header() {
        let config = SessionConfig::default();
        let options = CookieOptions::for_request(
            &config,
            &headers("forwarded", "for=192.0.2.60;proto=https;by=203.0.113.43"),
        );
        assert!(options.secure);
    }

    #[test]
    fn explicit_settings_override_detection() {
        let always = SessionConfig {
            secure_cookies: SecureCookies::Always,
            ..SessionConfig::default()
        };
        let never = SessionConfig {
            secure_cookies: SecureCookies::Never,
            ..SessionConfig::default()
        };

        assert!(CookieOptions::for_request(&always, &HeaderMap::new()).secure);
        assert!(!CookieOptions::for_request(&never, &headers("x-forwarded-proto", "https")).secure);
    }

    #[test]
    fn issued_cookie_is_http_only_and_site_wide() {
        let cookie = issue(
            STATE_COOKIE,
            "abc".to_string(),
            CookieOptions {
                secure: true,
                ttl: Duration::hours(1),
            },
        );

        assert_eq!(cookie.name(), "state");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::hours(1)));
    }

    #[test]
    fn forget_expires_only_presented_cookies() {
        let presented = CookieJar::from_headers(&headers("cookie", "state=abc"));

        let jar = forget(forget(presented, STATE_COOKIE), NONCE_COOKIE);
        assert_eq!(read(&jar, STATE_COOKIE), None);

        let response = (jar, ()).into_response();
        let set_cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(set_cookies.len(), 1, "{set_cookies:?}");
        assert!(set_cookies[0].starts_with("state=;"));
        assert!(set_cookies[0].contains("Path=/"));
        assert!(set_cookies[0].contains("Max-Age=0"));
    }

    #[test]
    fn empty_cookie_reads_as_absent() {
        let jar = CookieJar::new()
            .add(Cookie::new(ID_TOKEN_COOKIE, ""))
            .add(Cookie::new(REFRESH_TOKEN_COOKIE, "r"));

        assert_eq!(read(&jar, ID_TOKEN_COOKIE), None);
        assert_eq!(read(&jar, REFRESH_TOKEN_COOKIE), Some("r".to_string()));
        assert_eq!(read(&jar, STATE_COOKIE), None);
    }
}
