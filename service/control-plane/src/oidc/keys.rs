use crate::config::Config;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{PublicKeyParts, RsaPrivateKey, RsaPublicKey};

/// The RSA keypair this provider signs id/access tokens with, plus the
/// `kid` it advertises at `/oidc/jwks`. Held as Rocket managed state, loaded
/// once at boot; rotation is not implemented, only a single active key.
pub struct SigningKeypair {
    pub kid: String,
    pub encoding_key: EncodingKey,
    pub decoding_key: DecodingKey,
    public: RsaPublicKey,
}

impl SigningKeypair {
    /// Loads the keypair from `oidcProvider.signingKeyPEM` when configured,
    /// otherwise generates a fresh 2048-bit RSA key at boot.
    pub fn load_or_generate(config: &Config) -> Self {
        match &config.oidc_provider.signing_key_pem {
            Some(pem) => Self::from_pem(pem),
            None => Self::generate(),
        }
    }

    fn generate() -> Self {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).expect("RSA key generation must succeed");
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .expect("PKCS8 PEM encoding must succeed");
        Self::build(&pem, private.to_public_key())
    }

    fn from_pem(pem: &str) -> Self {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .expect("configured oidcProvider.signingKeyPEM must be a valid PKCS8 RSA private key");
        Self::build(pem, private.to_public_key())
    }

    fn build(pem: &str, public: RsaPublicKey) -> Self {
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("valid RSA PEM for signing");
        let decoding_key = DecodingKey::from_rsa_components(
            &base64_url(&public.n().to_bytes_be()),
            &base64_url(&public.e().to_bytes_be()),
        )
        .expect("valid RSA public components");
        let kid = names::uuid();
        Self {
            kid,
            encoding_key,
            decoding_key,
            public,
        }
    }

    /// Renders this key as a single-entry JWKS `keys[0]` document per §4.8.
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": self.kid,
            "n": base64_url(&self.public.n().to_bytes_be()),
            "e": base64_url(&self.public.e().to_bytes_be()),
        })
    }
}

fn base64_url(bytes: &[u8]) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}
