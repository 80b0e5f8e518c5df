pub mod routes;

use crate::config::{Config, KubeconfigMode};
use crate::errors::InvalidInput;
use kind::Kind;
use rand::rngs::OsRng;
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_RSA_SHA256};
use result::Result;
use rsa::pkcs8::EncodePrivateKey;
use serde::Serialize;

#[derive(Serialize, Kind)]
pub struct KubeconfigResult {
    pub kubeconfig: String,
    pub namespace: String,
    #[serde(rename = "clusterName")]
    pub cluster_name: String,
    pub mode: String,
    pub instructions: String,
}

fn cluster_name(config: &Config) -> String {
    config.cluster.name.clone().unwrap_or_else(|| "genet".to_string())
}

/// Generates a fresh 2048-bit RSA key and a client-auth CSR for `identifier`,
/// submits it with `signerName=kubernetes.io/kube-apiserver-client`,
/// approves it server-side, and polls for the issued certificate per §4.7 /
/// §5's 30 s / 500 ms budget.
async fn issue_client_cert(identifier: &str, config: &Config) -> Result<(String, String)> {
    let private_key = rsa::RsaPrivateKey::new(&mut OsRng, 2048)
        .map_err(|_| InvalidInput::new("kubeconfig", "failed to generate client key"))?;
    let pkcs8_der = private_key
        .to_pkcs8_der()
        .map_err(|_| InvalidInput::new("kubeconfig", "failed to encode client key"))?;
    let key_pair = KeyPair::from_der(pkcs8_der.as_bytes())
        .map_err(|_| InvalidInput::new("kubeconfig", "failed to load client key"))?;

    let mut params = CertificateParams::new(vec![]);
    params.alg = &PKCS_RSA_SHA256;
    params.key_pair = Some(key_pair);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, identifier);
    params.distinguished_name = dn;

    let cert = Certificate::from_params(params)
        .map_err(|_| InvalidInput::new("kubeconfig", "failed to assemble client certificate request"))?;
    let csr_pem = cert
        .serialize_request_pem()
        .map_err(|_| InvalidInput::new("kubeconfig", "failed to serialize CSR"))?;
    let key_pem = cert.serialize_private_key_pem();

    let csr_name = format!("genet-{}-{}", identifier, names::uuid());
    let expiration_seconds = (config.kubeconfig.cert_validity_hours as i32) * 3600;
    k8s::csr::submit(&csr_name, csr_pem.as_bytes(), expiration_seconds).await?;
    k8s::csr::approve(&csr_name).await?;
    let cert_der = k8s::csr::poll_for_certificate(&csr_name).await?;

    Ok((pem_encode("CERTIFICATE", &cert_der), key_pem))
}

/// Minimal RFC 7468 textual encoding: base64 body wrapped at 64 columns
/// between `BEGIN`/`END` markers for `label`.
fn pem_encode(label: &str, der: &[u8]) -> String {
    let body = base64::encode(der);
    let mut wrapped = String::new();
    for chunk in body.as_bytes().chunks(64) {
        wrapped.push_str(std::str::from_utf8(chunk).unwrap());
        wrapped.push('\n');
    }
    format!("-----BEGIN {label}-----\n{body}-----END {label}-----\n", label = label, body = wrapped)
}

fn render_cert_kubeconfig(config: &Config, identifier: &str, cert_pem: &str, key_pem: &str) -> String {
    let namespace = names::namespace_of(identifier);
    let name = cluster_name(config);
    let server = config.cluster.api_server_url.clone().unwrap_or_default();
    let ca_data = config.cluster.ca_data.clone().unwrap_or_default();
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: {name}
  cluster:
    server: {server}
    certificate-authority-data: {ca_data}
contexts:
- name: user-{identifier}
  context:
    cluster: {name}
    namespace: {namespace}
    user: {identifier}
current-context: user-{identifier}
users:
- name: {identifier}
  user:
    client-certificate-data: {cert_b64}
    client-key-data: {key_b64}
"#,
        name = name,
        server = server,
        ca_data = ca_data,
        identifier = identifier,
        namespace = namespace,
        cert_b64 = base64::encode(cert_pem),
        key_b64 = base64::encode(key_pem),
    )
}

fn render_oidc_kubeconfig(config: &Config, identifier: &str) -> String {
    let namespace = names::namespace_of(identifier);
    let name = cluster_name(config);
    let server = config.cluster.api_server_url.clone().unwrap_or_default();
    let ca_data = config.cluster.ca_data.clone().unwrap_or_default();
    let issuer = config.oidc_provider.issuer_url.clone();
    let client_id = config.oidc_provider.kubernetes_client_id.clone();
    let client_secret = config
        .oidc_provider
        .web_client_secret
        .as_ref()
        .map(|s| s.raw_secret().to_string())
        .unwrap_or_default();
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: {name}
  cluster:
    server: {server}
    certificate-authority-data: {ca_data}
contexts:
- name: user-{identifier}
  context:
    cluster: {name}
    namespace: {namespace}
    user: {identifier}
current-context: user-{identifier}
users:
- name: {identifier}
  user:
    exec:
      apiVersion: client.authentication.k8s.io/v1beta1
      command: kubectl
      args:
      - oidc-login
      - get-token
      - --oidc-issuer-url={issuer}
      - --oidc-client-id={client_id}
      - --oidc-client-secret={client_secret}
"#,
        name = name,
        server = server,
        ca_data = ca_data,
        identifier = identifier,
        namespace = namespace,
        issuer = issuer,
        client_id = client_id,
        client_secret = client_secret,
    )
}

/// Issues the user's kubeconfig per §4.7, dispatching on the configured
/// `kubeconfig.mode`.
pub async fn issue(identifier: &str, config: &Config) -> Result<KubeconfigResult> {
    let kubeconfig = match config.kubeconfig.mode {
        KubeconfigMode::Cert => {
            let (cert_pem, key_pem) = issue_client_cert(identifier, config).await?;
            render_cert_kubeconfig(config, identifier, &cert_pem, &key_pem)
        }
        KubeconfigMode::Oidc => {
            if !config.oidc_provider.enabled {
                return Err(InvalidInput::new("kubeconfig", "OIDC provider is not enabled").into());
            }
            render_oidc_kubeconfig(config, identifier)
        }
    };
    Ok(KubeconfigResult {
        kubeconfig,
        namespace: names::namespace_of(identifier),
        cluster_name: cluster_name(config),
        mode: match config.kubeconfig.mode {
            KubeconfigMode::Cert => "cert".to_string(),
            KubeconfigMode::Oidc => "oidc".to_string(),
        },
        instructions: "save this file and export KUBECONFIG=<path> to use kubectl".to_string(),
    })
}
