use crate::oidc::keys::SigningKeypair;
use rocket::serde::json::Json;
use rocket::{get, State};
use serde::Serialize;

#[derive(Serialize)]
pub struct Jwks {
    keys: Vec<serde_json::Value>,
}

/// Serves the active signing key as a JWKS document at `/oidc/jwks`.
#[get("/oidc/jwks")]
pub fn jwks(keypair: &State<SigningKeypair>) -> Json<Jwks> {
    Json(Jwks {
        keys: vec![keypair.jwk_json()],
    })
}
