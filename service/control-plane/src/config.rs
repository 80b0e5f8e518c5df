use crate::env::Secret;
use serde::{Deserialize, Serialize};
use std::fs;

fn default_pod_limit() -> u32 {
    5
}
fn default_gpu_limit() -> u32 {
    4
}
fn default_scheduling_mode() -> SchedulingMode {
    SchedulingMode::Exclusive
}
fn default_max_pods_per_gpu() -> u32 {
    0
}
fn default_cert_validity_hours() -> u32 {
    24 * 365
}
fn default_kubeconfig_mode() -> KubeconfigMode {
    KubeconfigMode::Cert
}
fn default_session_ttl_hours() -> i64 {
    24
}
fn default_refresh_ttl_hours() -> i64 {
    24
}
fn default_userinfo_source() -> UserinfoSource {
    UserinfoSource::Endpoint
}
fn default_username_claim() -> String {
    "preferred_username".to_string()
}
fn default_commit_image() -> String {
    "docker.io/library/nerdctl:latest".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    Exclusive,
    Sharing,
}

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum KubeconfigMode {
    Cert,
    Oidc,
}

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum VolumeScope {
    User,
    Pod,
}

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    Pvc,
    Hostpath,
}

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReclaimPolicy {
    Retain,
    Delete,
}

#[derive(Deserialize, Debug, Clone)]
pub struct VolumeConfig {
    pub name: String,
    #[serde(rename = "mountPath")]
    pub mount_path: String,
    pub scope: VolumeScope,
    #[serde(rename = "type")]
    pub kind: VolumeType,
    #[serde(rename = "storageClass")]
    pub storage_class: Option<String>,
    pub size: Option<String>,
    #[serde(rename = "accessMode")]
    pub access_mode: Option<String>,
    #[serde(rename = "reclaimPolicy")]
    pub reclaim_policy: ReclaimPolicy,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GpuConfig {
    #[serde(rename = "availableTypes", default)]
    pub available_types: Vec<String>,
    #[serde(rename = "schedulingMode", default = "default_scheduling_mode")]
    pub scheduling_mode: SchedulingMode,
    #[serde(rename = "maxPodsPerGPU", default = "default_max_pods_per_gpu")]
    pub max_pods_per_gpu: u32,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            available_types: vec![],
            scheduling_mode: default_scheduling_mode(),
            max_pods_per_gpu: default_max_pods_per_gpu(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { volumes: vec![] }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum UserinfoSource {
    Endpoint,
    Token,
    Both,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct OauthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "authURL", default)]
    pub auth_url: String,
    #[serde(rename = "tokenURL", default)]
    pub token_url: String,
    #[serde(rename = "userinfoURL", default)]
    pub userinfo_url: String,
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    pub client_secret: Option<Secret>,
    #[serde(rename = "redirectURL", default)]
    pub redirect_url: String,
    #[serde(rename = "frontendURL", default)]
    pub frontend_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(rename = "userinfoSource", default = "default_userinfo_source")]
    pub userinfo_source: UserinfoSource,
    #[serde(rename = "usernameClaim", default = "default_username_claim")]
    pub username_claim: String,
    pub session_secret: Secret,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct OidcProviderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "issuerURL", default)]
    pub issuer_url: String,
    #[serde(rename = "kubernetesClientID", default)]
    pub kubernetes_client_id: String,
    #[serde(rename = "webClientID", default)]
    pub web_client_id: String,
    pub web_client_secret: Option<Secret>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(rename = "signingKeyPEM")]
    pub signing_key_pem: Option<String>,
    #[serde(rename = "rbacAutocreate", default)]
    pub rbac_autocreate: bool,
    #[serde(rename = "upstreamRedirectURL", default)]
    pub upstream_redirect_url: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ClusterConfig {
    pub name: Option<String>,
    #[serde(rename = "caData")]
    pub ca_data: Option<String>,
    #[serde(rename = "apiServerURL")]
    pub api_server_url: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct KubeconfigConfig {
    #[serde(default = "default_kubeconfig_mode")]
    pub mode: KubeconfigMode,
    #[serde(rename = "certValidityHours", default = "default_cert_validity_hours")]
    pub cert_validity_hours: u32,
}

impl Default for KubeconfigConfig {
    fn default() -> Self {
        Self {
            mode: default_kubeconfig_mode(),
            cert_validity_hours: default_cert_validity_hours(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub enabled: bool,
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    #[serde(rename = "insecureRegistry", default)]
    pub insecure_registry: bool,
    #[serde(rename = "commitImage", default = "default_commit_image")]
    pub commit_image: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AcceleratorType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "resourceName")]
    pub resource_name: String,
    #[serde(rename = "metricName")]
    pub metric_name: String,
    #[serde(rename = "deviceLabel")]
    pub device_label: String,
    #[serde(rename = "nodeLabel")]
    pub node_label: String,
    #[serde(rename = "podLabel")]
    pub pod_label: String,
    #[serde(rename = "namespaceLabel")]
    pub namespace_label: String,
    #[serde(rename = "visibleDevicesEnv")]
    pub visible_devices_env: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(rename = "podLimitPerUser", default = "default_pod_limit")]
    pub pod_limit_per_user: u32,
    #[serde(rename = "gpuLimitPerUser", default = "default_gpu_limit")]
    pub gpu_limit_per_user: u32,
    #[serde(default)]
    pub gpu: GpuConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub oauth: OauthConfig,
    #[serde(rename = "oidcProvider", default)]
    pub oidc_provider: OidcProviderConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub kubeconfig: KubeconfigConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(rename = "prometheusURL")]
    pub prometheus_url: Option<String>,
    #[serde(rename = "acceleratorTypes", default)]
    pub accelerator_types: Vec<AcceleratorType>,
    #[serde(rename = "presetImages", default)]
    pub preset_images: Vec<String>,
    #[serde(rename = "sessionTTLHours", default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    #[serde(rename = "refreshTokenTTLHours", default = "default_refresh_ttl_hours")]
    pub refresh_token_ttl_hours: i64,
}

impl Config {
    /// Loads the YAML document at [crate::env::config_path]. Missing keys fall back to the
    /// defaults documented on each field; a missing file is an empty document (every field
    /// defaults) so that a fresh install can boot with `oauth.enabled=false`.
    pub fn load() -> Self {
        let path = crate::env::config_path();
        let contents = fs::read_to_string(&path).unwrap_or_default();
        if contents.trim().is_empty() {
            serde_yaml::from_str("{}").expect("empty document deserializes to defaults")
        } else {
            serde_yaml::from_str(&contents)
                .unwrap_or_else(|err| panic!("failed to parse config at {}: {}", path, err))
        }
    }

    pub fn gpu_resource_name_for(&self, gpu_type: &str) -> Option<&AcceleratorType> {
        self.accelerator_types.iter().find(|a| a.kind == gpu_type)
    }
}

/// A deterministic config document used by handler unit tests so assertions
/// don't depend on a file living on the test runner's disk.
#[cfg(test)]
pub fn test_config() -> Config {
    serde_yaml::from_str(
        r#"
podLimitPerUser: 2
gpuLimitPerUser: 4
gpu:
  availableTypes: ["a100"]
  schedulingMode: sharing
  maxPodsPerGPU: 2
storage:
  volumes: []
oauth:
  enabled: false
  session_secret: test-secret
oidcProvider:
  enabled: false
"#,
    )
    .unwrap()
}
