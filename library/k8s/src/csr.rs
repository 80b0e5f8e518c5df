use crate::errors::ApiError;
use error::*;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestSpec, CertificateSigningRequestStatus,
};
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use result::Result;
use std::time::{Duration, Instant};

/// Budget for polling an approved CSR for its issued certificate, per §5:
/// bounded at 30 seconds total, polled every 500 milliseconds.
pub const POLL_BUDGET: Duration = Duration::from_secs(30);
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Submits a `CertificateSigningRequest` for `signerName=kubernetes.io/kube-apiserver-client`,
/// usage `client auth`, for the given PEM-encoded CSR bytes.
pub async fn submit<N: AsRef<str>>(
    name: N,
    csr_pem: &[u8],
    expiration_seconds: i32,
) -> Result<CertificateSigningRequest> {
    let name = name.as_ref();
    let client: Api<CertificateSigningRequest> = crate::client::cluster().await;
    let csr = CertificateSigningRequest {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: CertificateSigningRequestSpec {
            request: k8s_openapi::ByteString(csr_pem.to_vec()),
            signer_name: "kubernetes.io/kube-apiserver-client".to_string(),
            usages: Some(vec!["client auth".to_string()]),
            expiration_seconds: Some(expiration_seconds),
            ..Default::default()
        },
        status: None,
    };
    client
        .create(&PostParams::default(), &csr)
        .await
        .map_err(|err| ApiError::from(err).into())
}

/// Approves a pending CSR by patching its `status.conditions` subresource.
pub async fn approve<N: AsRef<str>>(name: N) -> Result<()> {
    let name = name.as_ref();
    let client: Api<CertificateSigningRequest> = crate::client::cluster().await;
    let patch = serde_json::json!({
        "status": {
            "conditions": [{
                "type": "Approved",
                "reason": "GenetKubeconfigIssuer",
                "message": "approved automatically on behalf of the requesting user",
                "status": "True",
            }]
        }
    });
    client
        .patch_approval(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map(|_| ())
        .map_err(|err| ApiError::from(err).into())
}

#[derive(Error, GenetError, Kind, HttpCode, Debug)]
#[error("CSR '{name}' was not issued a certificate within the 30 second polling budget")]
#[code(Status::InternalServerError)]
pub struct CsrNotIssued {
    name: String,
}

/// Polls an approved CSR for its issued certificate, bounded by
/// [POLL_BUDGET] at [POLL_INTERVAL] cadence. Deletes the CSR once the
/// certificate has been retrieved (success) or the budget is exhausted
/// (failure), matching §5's "CSR polling bounded at 30s ... failure deletes
/// the CSR".
pub async fn poll_for_certificate<N: AsRef<str>>(name: N) -> Result<Vec<u8>> {
    let name = name.as_ref();
    let client: Api<CertificateSigningRequest> = crate::client::cluster().await;
    let started = Instant::now();
    let cert = loop {
        let csr = client.get(name).await.map_err(ApiError::from)?;
        if let Some(CertificateSigningRequestStatus {
            certificate: Some(cert),
            ..
        }) = csr.status
        {
            break Some(cert.0);
        }
        if started.elapsed() >= POLL_BUDGET {
            break None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    let _ = client.delete(name, &DeleteParams::default()).await;

    cert.ok_or_else(|| {
        CsrNotIssued {
            name: name.to_string(),
        }
        .into()
    })
}
