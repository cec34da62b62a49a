use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::Config;
use crate::session::IssuedSession;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
pub const CSRF_COOKIE: &str = "csrfToken";
pub const CSRF_HEADER: &str = "x-csrf-token";

fn build(name: &'static str, value: String, config: &Config, http_only: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(http_only)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

fn with_max_age(mut cookie: Cookie<'static>, ttl: Duration) -> Cookie<'static> {
    cookie.set_max_age(time::Duration::seconds(ttl.as_secs() as i64));
    cookie
}

/// Sets both session cookies, each living as long as its token.
pub fn set_session(jar: CookieJar, config: &Config, session: &IssuedSession) -> CookieJar {
    jar.add(with_max_age(
        build(ACCESS_COOKIE, session.access_token.clone(), config, true),
        config.access_ttl,
    ))
    .add(with_max_age(
        build(REFRESH_COOKIE, session.refresh_token.clone(), config, true),
        config.refresh_ttl,
    ))
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

/// Scripts must read this one to echo it back in `X-CSRF-Token`.
pub fn set_csrf(jar: CookieJar, config: &Config, token: String) -> CookieJar {
    jar.add(build(CSRF_COOKIE, token, config, false))
}

pub fn value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubenote_types::api::Claims;
    use uuid::Uuid;

    fn session() -> IssuedSession {
        IssuedSession {
            claims: Claims {
                sub: Uuid::new_v4(),
                username: "alice".into(),
                exp: 0,
            },
            access_token: "access".into(),
            refresh_token: "refresh".into(),
        }
    }

    #[test]
    fn session_cookies_are_http_only_with_token_lifetimes() {
        let config = Config::for_tests();
        let jar = set_session(CookieJar::new(), &config, &session());

        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.value(), "access");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Lax));
        assert_eq!(access.max_age(), Some(time::Duration::seconds(900)));

        let refresh = jar.get(REFRESH_COOKIE).unwrap();
        assert_eq!(refresh.max_age(), Some(time::Duration::seconds(7 * 24 * 3600)));
    }

    #[test]
    fn csrf_cookie_is_script_readable() {
        let mut config = Config::for_tests();
        config.cookie_secure = true;
        let jar = set_csrf(CookieJar::new(), &config, "tok".into());
        let cookie = jar.get(CSRF_COOKIE).unwrap();
        assert_eq!(cookie.http_only(), Some(false));
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn clearing_removes_both_session_cookies() {
        let config = Config::for_tests();
        let jar = clear_session(set_session(CookieJar::new(), &config, &session()));
        assert!(value(&jar, ACCESS_COOKIE).is_none());
        assert!(value(&jar, REFRESH_COOKIE).is_none());
    }
}
