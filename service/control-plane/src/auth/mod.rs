pub mod oauth;

use crate::config::Config;
use crate::env::Secret;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "genet_session";

#[derive(Serialize, Deserialize)]
struct SessionClaims {
    username: String,
    email: String,
    exp: i64,
}

/// Signs a session JWT for `username`/`email` valid for `ttl_hours`, per §4.2.
pub fn sign_session(username: &str, email: &str, secret: &Secret, ttl_hours: i64) -> String {
    let claims = SessionClaims {
        username: username.to_string(),
        email: email.to_string(),
        exp: (Utc::now() + Duration::hours(ttl_hours)).timestamp(),
    };
    encode(
        &Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.raw_secret().as_bytes()),
    )
    .expect("HS256 encoding of a small claims struct never fails")
}

fn verify_session(token: &str, secret: &Secret) -> Option<(String, String)> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.raw_secret().as_bytes()),
        &Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .ok()
    .map(|data| (data.claims.username, data.claims.email))
}

pub fn set_session_cookie(jar: &CookieJar<'_>, username: &str, email: &str, config: &Config) {
    let token = sign_session(
        username,
        email,
        &config.oauth.session_secret,
        config.session_ttl_hours,
    );
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_path("/");
    jar.add(cookie);
}

/// The resolved calling principal, populated by the three-tier fallback of §4.2:
/// session cookie, then proxy headers, then (only with OAuth disabled) a
/// development fallback reading `?user=` or defaulting to `dev-user`.
#[derive(Debug, Clone)]
pub struct Principal {
    pub username: String,
    pub email: String,
    pub authenticated: bool,
}

impl Principal {
    fn unauthenticated() -> Self {
        Self {
            username: String::new(),
            email: String::new(),
            authenticated: false,
        }
    }

    fn resolve(req: &Request<'_>, config: &Config) -> Self {
        if let Some(cookie) = req.cookies().get(SESSION_COOKIE) {
            if let Some((username, email)) = verify_session(cookie.value(), &config.oauth.session_secret) {
                return Self {
                    username,
                    email,
                    authenticated: true,
                };
            }
        }

        let headers = req.headers();
        let proxy_user = headers
            .get_one("X-Auth-Request-User")
            .or_else(|| headers.get_one("X-Auth-Request-Preferred-Username"));
        let proxy_email = headers.get_one("X-Auth-Request-Email");
        if let (Some(username), Some(email)) = (proxy_user, proxy_email) {
            return Self {
                username: username.to_string(),
                email: email.to_string(),
                authenticated: true,
            };
        }

        if !config.oauth.enabled {
            let username = req
                .query_value::<String>("user")
                .and_then(|r| r.ok())
                .unwrap_or_else(|| "dev-user".to_string());
            return Self {
                username: username.clone(),
                email: format!("{}@localhost", username),
                authenticated: true,
            };
        }

        Self::unauthenticated()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = req
            .guard::<&State<Config>>()
            .await
            .expect("Config is always managed state");
        Outcome::Success(Principal::resolve(req, config))
    }
}

/// Like [Principal] but fails the request with 401 when not authenticated,
/// matching §4.2's "downstream handlers either require authenticated or fail".
pub struct Authenticated(pub Principal);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Authenticated {
    type Error = crate::errors::Unauthorized;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let principal = match req.guard::<Principal>().await {
            Outcome::Success(p) => p,
            _ => return Outcome::Error((Status::Unauthorized, crate::errors::Unauthorized {})),
        };
        if principal.authenticated {
            Outcome::Success(Authenticated(principal))
        } else {
            Outcome::Error((Status::Unauthorized, crate::errors::Unauthorized {}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_session_claims() {
        let secret = Secret::from("test-secret");
        let token = sign_session("zhang-san", "zs@example.com", &secret, 24);
        let (username, email) = verify_session(&token, &secret).unwrap();
        assert_eq!(username, "zhang-san");
        assert_eq!(email, "zs@example.com");
    }

    #[test]
    fn rejects_tampered_token() {
        let secret = Secret::from("test-secret");
        let other = Secret::from("other-secret");
        let token = sign_session("zhang-san", "zs@example.com", &secret, 24);
        assert!(verify_session(&token, &other).is_none());
    }
}
