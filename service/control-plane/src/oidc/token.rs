use crate::config::Config;
use crate::oidc::keys::SigningKeypair;
use crate::oidc::store::{self, RefreshTokenEntry};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, Header};
use rocket::form::Form;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::Responder;
use rocket::serde::json::Json;
use rocket::{post, FromForm, State};
use serde::{Deserialize, Serialize};
use term_colors::cyan;

#[derive(FromForm)]
pub struct TokenForm {
    grant_type: String,
    code: Option<String>,
    redirect_uri: Option<String>,
    client_id: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nonce: Option<String>,
    pub email: String,
    pub preferred_username: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    access_token: String,
    id_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: i64,
}

/// An RFC 6749 §5.2 error body. This endpoint speaks the OAuth wire format
/// directly rather than this service's usual `{payload, error}` envelope, so
/// `kubectl oidc-login` and other off-the-shelf clients can parse it.
pub struct TokenError {
    status: Status,
    error: &'static str,
    description: String,
}

impl TokenError {
    fn invalid_grant(description: impl Into<String>) -> Self {
        Self {
            status: Status::BadRequest,
            error: "invalid_grant",
            description: description.into(),
        }
    }
    fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            status: Status::BadRequest,
            error: "invalid_request",
            description: description.into(),
        }
    }
    fn unsupported_grant_type() -> Self {
        Self {
            status: Status::BadRequest,
            error: "unsupported_grant_type",
            description: "only 'authorization_code' and 'refresh_token' are supported".to_string(),
        }
    }
}

impl<'r> Responder<'r, 'static> for TokenError {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'static> {
        let body = serde_json::json!({
            "error": self.error,
            "error_description": self.description,
        })
        .to_string();
        let mut response = rocket::Response::build();
        response.header(rocket::http::ContentType::JSON);
        response.status(self.status);
        response.sized_body(body.len(), std::io::Cursor::new(body));
        Ok(response.finalize())
    }
}

fn sign(claims: &TokenClaims, keypair: &SigningKeypair) -> Result<String, TokenError> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(keypair.kid.clone());
    jsonwebtoken::encode(&header, claims, &keypair.encoding_key)
        .map_err(|_| TokenError::invalid_grant("failed to sign token"))
}

async fn issue_tokens(
    client_id: &str,
    username: &str,
    email: &str,
    nonce: Option<String>,
    config: &Config,
    keypair: &SigningKeypair,
) -> Result<TokenResponse, TokenError> {
    let now = Utc::now();
    let expires_in = config.session_ttl_hours * 3600;
    let claims = TokenClaims {
        iss: config.oidc_provider.issuer_url.clone(),
        sub: username.to_string(),
        aud: client_id.to_string(),
        exp: (now + Duration::hours(config.session_ttl_hours)).timestamp(),
        iat: now.timestamp(),
        nonce,
        email: email.to_string(),
        preferred_username: username.to_string(),
    };
    let id_token = sign(&claims, keypair)?;
    let access_token = sign(
        &TokenClaims {
            nonce: None,
            ..claims
        },
        keypair,
    )?;

    let refresh_token = names::uuid();
    store::insert_refresh_token(
        refresh_token.clone(),
        RefreshTokenEntry {
            client_id: client_id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            expires_at: now + Duration::hours(config.refresh_token_ttl_hours),
        },
    )
    .await;

    Ok(TokenResponse {
        access_token,
        id_token,
        refresh_token,
        token_type: "Bearer",
        expires_in,
    })
}

async fn exchange_authorization_code(
    form: &TokenForm,
    config: &Config,
    keypair: &SigningKeypair,
) -> Result<TokenResponse, TokenError> {
    let code = form
        .code
        .as_deref()
        .ok_or_else(|| TokenError::invalid_request("'code' is required"))?;
    let redirect_uri = form
        .redirect_uri
        .as_deref()
        .ok_or_else(|| TokenError::invalid_request("'redirect_uri' is required"))?;
    let client_id = form
        .client_id
        .as_deref()
        .ok_or_else(|| TokenError::invalid_request("'client_id' is required"))?;

    let entry = store::consume_code(code)
        .await
        .ok_or_else(|| TokenError::invalid_grant("code is unknown or already used"))?;
    if entry.expires_at < Utc::now() {
        return Err(TokenError::invalid_grant("code has expired"));
    }
    if entry.client_id != client_id || entry.redirect_uri != redirect_uri {
        return Err(TokenError::invalid_grant("code was not issued to this client/redirect_uri"));
    }

    info!("Redeeming authorization code for {} (client {})", cyan(&entry.username), cyan(client_id));
    issue_tokens(client_id, &entry.username, &entry.email, entry.nonce, config, keypair).await
}

async fn exchange_refresh_token(
    form: &TokenForm,
    config: &Config,
    keypair: &SigningKeypair,
) -> Result<TokenResponse, TokenError> {
    let token = form
        .refresh_token
        .as_deref()
        .ok_or_else(|| TokenError::invalid_request("'refresh_token' is required"))?;
    let client_id = form
        .client_id
        .as_deref()
        .ok_or_else(|| TokenError::invalid_request("'client_id' is required"))?;

    let entry = store::get_refresh_token(token)
        .await
        .ok_or_else(|| TokenError::invalid_grant("refresh token is unknown"))?;
    if entry.expires_at < Utc::now() || entry.client_id != client_id {
        return Err(TokenError::invalid_grant("refresh token has expired or does not match this client"));
    }

    let response = issue_tokens(client_id, &entry.username, &entry.email, None, config, keypair).await?;
    let username_log = entry.username.clone();
    store::rotate_refresh_token(
        token,
        response.refresh_token.clone(),
        RefreshTokenEntry {
            client_id: client_id.to_string(),
            username: entry.username,
            email: entry.email,
            expires_at: Utc::now() + Duration::hours(config.refresh_token_ttl_hours),
        },
    )
    .await;
    info!("Rotated refresh token for {} (client {})", cyan(&username_log), cyan(client_id));
    Ok(response)
}

/// `POST /oidc/token` per §4.8: `authorization_code` redeems a single-use
/// code minted by `/oidc/callback`; `refresh_token` rotates a live refresh
/// token. Both issue a fresh RS256 id/access token pair.
#[post("/oidc/token", data = "<form>")]
pub async fn token(
    form: Form<TokenForm>,
    config: &State<Config>,
    keypair: &State<SigningKeypair>,
) -> Result<Json<TokenResponse>, TokenError> {
    let result = match form.grant_type.as_str() {
        "authorization_code" => exchange_authorization_code(&form, config, keypair).await,
        "refresh_token" => exchange_refresh_token(&form, config, keypair).await,
        other => {
            warn!("Rejecting unsupported OIDC grant_type '{}'", other);
            Err(TokenError::unsupported_grant_type())
        }
    };
    result.map(Json)
}
