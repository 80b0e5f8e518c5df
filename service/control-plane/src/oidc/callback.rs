use crate::auth::oauth::{exchange_code, fetch_userinfo, derive_identity};
use crate::config::Config;
use crate::errors::InvalidInput;
use crate::oidc::authorize::{AuthorizeRequestContext, AUTHORIZE_COOKIE};
use crate::oidc::store::{self, AuthorizationCodeEntry};
use chrono::{Duration, Utc};
use result::Result;
use rocket::http::{Cookie, CookieJar};
use rocket::response::Redirect;
use rocket::{get, State};
use term_colors::cyan;

const CODE_TTL_SECONDS: i64 = 120;

fn recover_context(jar: &CookieJar<'_>) -> Result<AuthorizeRequestContext> {
    let raw = jar
        .get(AUTHORIZE_COOKIE)
        .ok_or_else(|| InvalidInput::new("state", "authorization request expired or was never started"))?;
    let decoded = base64::decode_config(raw.value(), base64::URL_SAFE_NO_PAD)
        .map_err(|_| InvalidInput::new("state", "authorization request cookie was malformed"))?;
    serde_json::from_slice(&decoded)
        .map_err(|_| InvalidInput::new("state", "authorization request cookie was malformed").into())
}

/// `GET /oidc/callback` per §4.8: exchanges the upstream code, resolves the
/// caller's identity, optionally bootstraps RBAC, and mints an authorization
/// code for the original caller before bouncing back to their `redirect_uri`.
#[get("/oidc/callback?<code>&<state>")]
pub async fn callback(
    code: String,
    state: String,
    jar: &CookieJar<'_>,
    config: &State<Config>,
) -> Result<Redirect> {
    let context = recover_context(jar)?;
    jar.remove(Cookie::named(AUTHORIZE_COOKIE));
    if context.internal_state != state {
        return Err(InvalidInput::new("state", "did not match the authorization request").into());
    }

    let access_token = exchange_code(config, &code).await?;
    let claims = fetch_userinfo(config, &access_token).await;
    let (username, email) = derive_identity(config, &claims);

    if config.oidc_provider.rbac_autocreate {
        let identifier = names::identifier(&username, &email);
        let namespace = names::namespace_of(&identifier);
        k8s::rbac::ensure_user_rbac(&namespace, &username).await?;
    }

    let authorization_code = names::uuid();
    let username_log = username.clone();
    let client_id_log = context.client_id.clone();
    store::insert_code(
        authorization_code.clone(),
        AuthorizationCodeEntry {
            client_id: context.client_id,
            redirect_uri: context.redirect_uri.clone(),
            username,
            email,
            nonce: context.nonce,
            expires_at: Utc::now() + Duration::seconds(CODE_TTL_SECONDS),
        },
    )
    .await;
    info!(
        "Issued OIDC authorization code for {} to client {}",
        cyan(&username_log),
        cyan(&client_id_log)
    );

    let separator = if context.redirect_uri.contains('?') { "&" } else { "?" };
    Ok(Redirect::to(format!(
        "{}{}code={}&state={}",
        context.redirect_uri, separator, authorization_code, context.state
    )))
}
