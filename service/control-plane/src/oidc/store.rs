use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A minted authorization code, single-use per §4.8: consuming it removes it
/// from the map before the caller is handed its contents.
#[derive(Clone)]
pub struct AuthorizationCodeEntry {
    pub client_id: String,
    pub redirect_uri: String,
    pub username: String,
    pub email: String,
    pub nonce: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RefreshTokenEntry {
    pub client_id: String,
    pub username: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

lazy_static! {
    static ref CODES: RwLock<HashMap<String, AuthorizationCodeEntry>> = RwLock::new(HashMap::new());
    static ref REFRESH_TOKENS: RwLock<HashMap<String, RefreshTokenEntry>> = RwLock::new(HashMap::new());
}

pub async fn insert_code(code: String, entry: AuthorizationCodeEntry) {
    CODES.write().await.insert(code, entry);
}

/// Removes and returns the code's entry, so a second redemption attempt
/// always misses. The caller is still responsible for checking `expires_at`.
pub async fn consume_code(code: &str) -> Option<AuthorizationCodeEntry> {
    CODES.write().await.remove(code)
}

pub async fn insert_refresh_token(token: String, entry: RefreshTokenEntry) {
    REFRESH_TOKENS.write().await.insert(token, entry);
}

pub async fn get_refresh_token(token: &str) -> Option<RefreshTokenEntry> {
    REFRESH_TOKENS.read().await.get(token).cloned()
}

/// Rotates a refresh token: the old one is deleted unconditionally, the new
/// one stored under `new_token`.
pub async fn rotate_refresh_token(old_token: &str, new_token: String, entry: RefreshTokenEntry) {
    let mut tokens = REFRESH_TOKENS.write().await;
    tokens.remove(old_token);
    tokens.insert(new_token, entry);
}

/// Drops expired codes and refresh tokens. Called by a background sweeper on
/// a 5-minute tick per §5 so the maps don't grow unboundedly with abandoned
/// logins.
pub async fn sweep_expired() {
    let now = Utc::now();
    CODES.write().await.retain(|_, entry| entry.expires_at > now);
    REFRESH_TOKENS.write().await.retain(|_, entry| entry.expires_at > now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(expires_in: Duration) -> AuthorizationCodeEntry {
        AuthorizationCodeEntry {
            client_id: "kubernetes".to_string(),
            redirect_uri: "http://localhost/callback".to_string(),
            username: "zhang-san".to_string(),
            email: "zs@example.com".to_string(),
            nonce: None,
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn code_is_single_use() {
        insert_code("code-a".to_string(), entry(Duration::minutes(5))).await;
        assert!(consume_code("code-a").await.is_some());
        assert!(consume_code("code-a").await.is_none());
    }

    #[tokio::test]
    async fn sweep_drops_expired_codes_only() {
        insert_code("code-expired".to_string(), entry(Duration::seconds(-1))).await;
        insert_code("code-live".to_string(), entry(Duration::minutes(5))).await;
        sweep_expired().await;
        assert!(consume_code("code-live").await.is_some());
    }
}
