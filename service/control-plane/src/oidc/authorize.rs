use crate::config::Config;
use crate::errors::InvalidInput;
use result::Result;
use rocket::http::{Cookie, CookieJar};
use rocket::response::Redirect;
use rocket::{get, State};
use serde::{Deserialize, Serialize};

pub const AUTHORIZE_COOKIE: &str = "genet_oidc_authorize";

/// The caller's authorization request, carried across the upstream OAuth
/// round trip in an HttpOnly cookie so `/oidc/callback` can recover it.
#[derive(Serialize, Deserialize)]
pub struct AuthorizeRequestContext {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub nonce: Option<String>,
    pub internal_state: String,
}

fn known_client(config: &Config, client_id: &str) -> bool {
    client_id == config.oidc_provider.kubernetes_client_id || client_id == config.oidc_provider.web_client_id
}

/// `GET /oidc/authorize` per §4.8: validates `client_id`/`redirect_uri`/
/// `response_type=code`, stashes the request in a cookie, and redirects to
/// the upstream OAuth provider with a fresh internal `state`.
#[allow(clippy::too_many_arguments)]
#[get("/oidc/authorize?<client_id>&<redirect_uri>&<response_type>&<scope>&<state>&<nonce>")]
pub fn authorize(
    client_id: String,
    redirect_uri: String,
    response_type: String,
    scope: Option<String>,
    state: String,
    nonce: Option<String>,
    jar: &CookieJar<'_>,
    config: &State<Config>,
) -> Result<Redirect> {
    if !config.oidc_provider.enabled {
        return Err(InvalidInput::new("oidcProvider", "is not enabled").into());
    }
    if response_type != "code" {
        return Err(InvalidInput::new("response_type", "only 'code' is supported").into());
    }
    if !known_client(config, &client_id) {
        return Err(InvalidInput::new("client_id", "is not a recognized client").into());
    }
    if redirect_uri.trim().is_empty() {
        return Err(InvalidInput::new("redirect_uri", "must not be empty").into());
    }

    let internal_state = names::uuid();
    let context = AuthorizeRequestContext {
        client_id,
        redirect_uri,
        scope: scope.unwrap_or_default(),
        state,
        nonce,
        internal_state: internal_state.clone(),
    };
    let encoded = base64::encode_config(
        serde_json::to_vec(&context).expect("AuthorizeRequestContext always serializes"),
        base64::URL_SAFE_NO_PAD,
    );
    let mut cookie = Cookie::new(AUTHORIZE_COOKIE, encoded);
    cookie.set_http_only(true);
    cookie.set_path("/");
    jar.add(cookie);

    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        config.oauth.auth_url,
        config.oauth.client_id,
        urlencoding_encode(&config.oidc_provider.upstream_redirect_url),
        urlencoding_encode(&config.oauth.scopes.join(" ")),
        internal_state,
    );
    Ok(Redirect::to(url))
}

fn urlencoding_encode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}
