use crate::oidc::keys::SigningKeypair;
use crate::oidc::token::TokenClaims;
use jsonwebtoken::{decode, Algorithm, Validation};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::{get, State};
use serde::Serialize;

pub struct BearerToken(String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.headers().get_one("Authorization").and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => Outcome::Success(BearerToken(token.to_string())),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

#[derive(Serialize)]
pub struct Userinfo {
    sub: String,
    email: String,
    preferred_username: String,
}

/// `GET /oidc/userinfo` per §4.8: validates the bearer access token's RS256
/// signature against the active signing key and echoes back its identity
/// claims.
#[get("/oidc/userinfo")]
pub fn userinfo(token: BearerToken, keypair: &State<SigningKeypair>) -> Result<rocket::serde::json::Json<Userinfo>, Status> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;
    let data = decode::<TokenClaims>(&token.0, &keypair.decoding_key, &validation).map_err(|_| Status::Unauthorized)?;
    Ok(rocket::serde::json::Json(Userinfo {
        sub: data.claims.sub,
        email: data.claims.email,
        preferred_username: data.claims.preferred_username,
    }))
}
