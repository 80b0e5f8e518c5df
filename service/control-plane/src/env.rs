use std::ffi::OsStr;
use std::fmt::{Debug, Display, Formatter};

/// The path to the YAML config document, configured under `GENET_CONFIG`.
/// Defaults to `/etc/genet/config.yaml`.
pub fn config_path() -> String {
    std::env::var("GENET_CONFIG").unwrap_or_else(|_| String::from("/etc/genet/config.yaml"))
}

/// The port this control plane listens on, configured under `PORT`. Defaults to 8080.
pub fn port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

/// The logging verbosity, configured under `LOG_LEVEL`. Defaults to `info`.
pub fn log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| String::from("info"))
}

/// The logging output format, configured under `LOG_FORMAT`. Either `text`
/// (env_logger's default) or `json`. Defaults to `text`.
pub fn log_format() -> String {
    std::env::var("LOG_FORMAT").unwrap_or_else(|_| String::from("text"))
}

/// A `Secret` obfuscates an underlying string from being accidentally printed to any logs.
///
/// Any attempt to format a `Secret` using either the [Display] ("{}") or [Debug] ("{:?}")
/// directives results in the string "<REDACTED>" rather than the underlying secret.
#[derive(Clone)]
pub struct Secret {
    secret: String,
}

impl Secret {
    pub fn raw_secret(&self) -> &str {
        self.as_ref()
    }
}

impl Display for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("<REDACTED>")
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("<REDACTED>")
    }
}

impl From<String> for Secret {
    fn from(secret: String) -> Self {
        Self { secret }
    }
}

impl From<&str> for Secret {
    fn from(secret: &str) -> Self {
        Self::from(secret.to_string())
    }
}

impl AsRef<str> for Secret {
    fn as_ref(&self) -> &str {
        self.secret.as_str()
    }
}

impl AsRef<OsStr> for Secret {
    fn as_ref(&self) -> &OsStr {
        self.secret.as_ref()
    }
}

impl<'de> serde::Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Secret::from(String::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_display_and_debug() {
        let secret = Secret::from("super-secret-value");
        assert_eq!(format!("{}", secret), "<REDACTED>");
        assert_eq!(format!("{:?}", secret), "<REDACTED>");
        assert_eq!(secret.raw_secret(), "super-secret-value");
    }
}
