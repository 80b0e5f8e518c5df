use crate::config::Config;
use rocket::serde::json::Json;
use rocket::{get, State};
use serde::Serialize;

#[derive(Serialize)]
pub struct Discovery {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    jwks_uri: String,
    response_types_supported: Vec<&'static str>,
    subject_types_supported: Vec<&'static str>,
    id_token_signing_alg_values_supported: Vec<&'static str>,
    scopes_supported: Vec<String>,
    grant_types_supported: Vec<&'static str>,
}

/// Serves the Discovery document at `/.well-known/openid-configuration`, per
/// §4.8. Every endpoint is derived from `oidcProvider.issuerURL` so a single
/// config value relocates the whole provider.
///
/// Unlike the rest of the API this returns the bare document, not the
/// `{payload, error}` envelope: OIDC/OAuth clients expect the standard shape
/// at this well-known path.
#[get("/.well-known/openid-configuration")]
pub fn discovery(config: &State<Config>) -> Json<Discovery> {
    let issuer = config.oidc_provider.issuer_url.trim_end_matches('/').to_string();
    Json(Discovery {
        authorization_endpoint: format!("{}/oidc/authorize", issuer),
        token_endpoint: format!("{}/oidc/token", issuer),
        userinfo_endpoint: format!("{}/oidc/userinfo", issuer),
        jwks_uri: format!("{}/oidc/jwks", issuer),
        issuer,
        response_types_supported: vec!["code"],
        subject_types_supported: vec!["public"],
        id_token_signing_alg_values_supported: vec!["RS256"],
        scopes_supported: config.oidc_provider.scopes.clone(),
        grant_types_supported: vec!["authorization_code", "refresh_token"],
    })
}
