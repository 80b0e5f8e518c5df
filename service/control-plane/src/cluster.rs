use crate::config::{Config, KubeconfigMode};
use kind::Kind;
use response::Response;
use rocket::{get, State};
use serde::Serialize;

#[derive(Serialize, Kind)]
pub struct ClusterInfo {
    #[serde(rename = "oidcEnabled")]
    pub oidc_enabled: bool,
    #[serde(rename = "kubeconfigMode")]
    pub kubeconfig_mode: String,
    #[serde(rename = "clusterName")]
    pub cluster_name: Option<String>,
    #[serde(rename = "issuerURL")]
    pub issuer_url: Option<String>,
    #[serde(rename = "certValidityHours")]
    pub cert_validity_hours: Option<u32>,
}

/// `GET /cluster/info`: the handful of cluster-level facts the frontend
/// needs before a user has logged in, e.g. to decide whether to show an
/// "oidc-login" hint for `kubectl`.
#[get("/cluster/info")]
pub fn info(config: &State<Config>) -> Response<ClusterInfo> {
    ClusterInfo {
        oidc_enabled: config.oidc_provider.enabled,
        kubeconfig_mode: match config.kubeconfig.mode {
            KubeconfigMode::Cert => "cert".to_string(),
            KubeconfigMode::Oidc => "oidc".to_string(),
        },
        cluster_name: config.cluster.name.clone(),
        issuer_url: config
            .oidc_provider
            .enabled
            .then(|| config.oidc_provider.issuer_url.clone()),
        cert_validity_hours: matches!(config.kubeconfig.mode, KubeconfigMode::Cert)
            .then(|| config.kubeconfig.cert_validity_hours),
    }
    .into()
}
