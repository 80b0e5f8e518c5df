use crate::auth::{set_session_cookie, Principal};
use crate::config::{Config, UserinfoSource};
use error::*;
use kind::Kind;
use response::Response;
use result::Result;
use rocket::http::{Cookie, CookieJar};
use rocket::response::Redirect;
use rocket::{get, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const STATE_COOKIE: &str = "genet_oauth_state";

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("the OAuth state cookie did not match the callback's state parameter")]
#[code(Status::BadRequest)]
pub struct StateMismatch {}

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("failed to exchange the authorization code with the upstream OAuth provider")]
#[code(Status::InternalServerError)]
pub struct ExchangeFailed {
    #[source]
    cause: StringError,
}

#[derive(Serialize, Kind)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "oauthEnabled")]
    pub oauth_enabled: bool,
    #[serde(rename = "loginURL")]
    pub login_url: Option<String>,
}

#[get("/auth/status")]
pub fn status(principal: Principal, config: &State<Config>) -> Response<AuthStatus> {
    AuthStatus {
        authenticated: principal.authenticated,
        username: principal.authenticated.then(|| principal.username.clone()),
        email: principal.authenticated.then(|| principal.email.clone()),
        oauth_enabled: config.oauth.enabled,
        login_url: config.oauth.enabled.then(|| "/api/auth/login".to_string()),
    }
    .into()
}

#[get("/auth/login")]
pub fn login(jar: &CookieJar<'_>, config: &State<Config>) -> Redirect {
    let state = Uuid::new_v4().to_string();
    let mut cookie = Cookie::new(STATE_COOKIE, state.clone());
    cookie.set_http_only(true);
    cookie.set_path("/");
    jar.add(cookie);

    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        config.oauth.auth_url,
        config.oauth.client_id,
        urlencoding_encode(&config.oauth.redirect_url),
        urlencoding_encode(&config.oauth.scopes.join(" ")),
        state,
    );
    Redirect::to(url)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Default)]
struct UserinfoResponse {
    #[serde(flatten)]
    claims: serde_json::Map<String, serde_json::Value>,
}

pub(crate) async fn exchange_code(config: &Config, code: &str) -> Result<String> {
    let client = reqwest::Client::new();
    let resp = client
        .post(&config.oauth.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &config.oauth.redirect_url),
            ("client_id", &config.oauth.client_id),
            (
                "client_secret",
                config
                    .oauth
                    .client_secret
                    .as_ref()
                    .map(|s| s.raw_secret())
                    .unwrap_or(""),
            ),
        ])
        .send()
        .await
        .map_err(|e| ExchangeFailed {
            cause: StringError::from(e.to_string()),
        })?
        .json::<TokenResponse>()
        .await
        .map_err(|e| ExchangeFailed {
            cause: StringError::from(e.to_string()),
        })?;
    Ok(resp.access_token)
}

fn decode_jwt_payload_unverified(token: &str) -> serde_json::Map<String, serde_json::Value> {
    token
        .split('.')
        .nth(1)
        .and_then(|payload| base64::decode_config(payload, base64::URL_SAFE_NO_PAD).ok())
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

/// Fetches upstream userinfo per the configured source (§4.2): `endpoint` calls
/// the userinfo endpoint with the access token, `token` decodes the access
/// token's JWT payload without verifying its signature, `both` tries the
/// endpoint and falls back to the token payload.
pub(crate) async fn fetch_userinfo(config: &Config, access_token: &str) -> serde_json::Map<String, serde_json::Value> {
    let from_endpoint = async {
        let client = reqwest::Client::new();
        client
            .get(&config.oauth.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .ok()?
            .json::<UserinfoResponse>()
            .await
            .ok()
            .map(|r| r.claims)
    };

    match config.oauth.userinfo_source {
        UserinfoSource::Token => decode_jwt_payload_unverified(access_token),
        UserinfoSource::Endpoint => from_endpoint.await.unwrap_or_default(),
        UserinfoSource::Both => match from_endpoint.await {
            Some(claims) if !claims.is_empty() => claims,
            _ => decode_jwt_payload_unverified(access_token),
        },
    }
}

pub fn derive_identity(config: &Config, claims: &serde_json::Map<String, serde_json::Value>) -> (String, String) {
    let username = claims
        .get(&config.oauth.username_claim)
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let email = claims
        .get("email")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown@localhost")
        .to_string();
    (username, email)
}

#[get("/auth/callback?<code>&<state>")]
pub async fn callback(
    code: String,
    state: String,
    jar: &CookieJar<'_>,
    config: &State<Config>,
) -> std::result::Result<Redirect, Box<dyn GenetError>> {
    let expected = jar
        .get(STATE_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(StateMismatch {})?;
    jar.remove(Cookie::named(STATE_COOKIE));
    if expected != state {
        return Err(StateMismatch {}.into());
    }

    let access_token = exchange_code(config, &code).await?;
    let claims = fetch_userinfo(config, &access_token).await;
    let (username, email) = derive_identity(config, &claims);

    set_session_cookie(jar, &username, &email, config);
    Ok(Redirect::to(config.oauth.frontend_url.clone()))
}

#[get("/auth/logout")]
pub fn logout(jar: &CookieJar<'_>) -> Redirect {
    jar.remove(Cookie::named(crate::auth::SESSION_COOKIE));
    Redirect::to("/")
}

fn urlencoding_encode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
