//! The `refreshToken` cookie.
//!
//! It is `HttpOnly` and `SameSite=Strict`, and scoped to the refresh
//! endpoint, so the browser attaches it to nothing else and page scripts
//! never see it.

use {
    cookie::{Cookie, SameSite, time::Duration},
    hyper::{HeaderMap, header::COOKIE},
    toolbelt_protocol::{
        ExpiresIn,
        endpoints::{REFRESH_COOKIE, REFRESH_PATH},
    },
};

fn build(value: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, value))
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .path(REFRESH_PATH)
        .max_age(Duration::seconds(max_age_seconds.max(0)))
        .build()
}

/// `Set-Cookie` value delivering a refresh token that lives as long as the
/// token itself.
#[must_use]
#[inline]
pub fn refresh_cookie(token: &str, expiry: ExpiresIn, secure: bool) -> String {
    build(token.to_owned(), expiry.as_seconds(), secure).to_string()
}

/// `Set-Cookie` value that makes the browser drop the refresh cookie.
#[must_use]
#[inline]
pub fn clear_refresh_cookie(secure: bool) -> String {
    build(String::new(), 0, secure).to_string()
}

/// Value of the refresh cookie, if the request carries a non-empty one.
#[must_use]
#[inline]
pub fn refresh_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use {super::*, hyper::header::HeaderValue};

    fn attributes(cookie: &str) -> Vec<String> {
        let mut attributes: Vec<String> = cookie.split("; ").map(str::to_owned).collect();
        attributes.sort();
        attributes
    }

    #[test]
    fn refresh_cookie_attributes() {
        let cookie = refresh_cookie("abc.def.ghi", ExpiresIn::from_seconds(604_800), false);
        assert_eq!(
            attributes(&cookie),
            [
                "HttpOnly",
                "Max-Age=604800",
                "Path=/api/auth/refresh",
                "SameSite=Strict",
                "refreshToken=abc.def.ghi",
            ]
        );

        let cookie = refresh_cookie("abc", ExpiresIn::from_seconds(60), true);
        assert!(attributes(&cookie).contains(&"Secure".to_owned()));
    }

    #[test]
    fn clearing_cookie() {
        let cookie = clear_refresh_cookie(false);
        let attributes = attributes(&cookie);
        assert!(attributes.contains(&"refreshToken=".to_owned()));
        assert!(attributes.contains(&"Max-Age=0".to_owned()));
        assert!(attributes.contains(&"Path=/api/auth/refresh".to_owned()));
        assert!(!attributes.contains(&"Secure".to_owned()));
    }

    #[test]
    fn extract() {
        let mut headers = HeaderMap::new();
        assert_eq!(refresh_token(&headers), None);

        headers.append(COOKIE, HeaderValue::from_static("theme=dark; lang=en"));
        assert_eq!(refresh_token(&headers), None);

        headers.append(COOKIE, HeaderValue::from_static("refreshToken=tok; x=1"));
        assert_eq!(refresh_token(&headers).as_deref(), Some("tok"));

        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("refreshToken="));
        assert_eq!(refresh_token(&headers), None);
    }
}
