use crate::errors::ApiError;
use error::*;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::error::ErrorResponse;
use result::Result;
use std::collections::BTreeMap;
use std::iter::FromIterator;

/// Reclaim policy attached to a `WorkspaceVolume`, consulted on pod delete (§4.4).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ReclaimPolicy {
    Retain,
    Delete,
}

/// Idempotently ensures a `WorkspaceVolume` PVC named `name` exists in `namespace`
/// with the given storage class, size, and access mode.
pub async fn ensure<N: AsRef<str>, NS: AsRef<str>>(
    namespace: NS,
    name: N,
    storage_class: Option<&str>,
    size: &str,
    access_mode: &str,
) -> Result<()> {
    let name = name.as_ref();
    let client: Api<PersistentVolumeClaim> = crate::client::namespaced(namespace).await;
    let pvc = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from_iter([(
                "genet.io/managed".to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![access_mode.to_string()]),
            storage_class_name: storage_class.map(|s| s.to_string()),
            resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
                requests: Some(BTreeMap::from_iter([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                limits: None,
            }),
            ..Default::default()
        }),
        status: None,
    };
    match client.create(&PostParams::default(), &pvc).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => Ok(()),
        Err(err) => Err(ApiError::from(err).into()),
    }
}

/// Deletes the named PVC. "Not found" is treated as success.
pub async fn delete<N: AsRef<str>, NS: AsRef<str>>(namespace: NS, name: N) -> Result<()> {
    let client: Api<PersistentVolumeClaim> = crate::client::namespaced(namespace).await;
    match client
        .delete(name.as_ref(), &kube::api::DeleteParams::default())
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => Ok(()),
        Err(err) => Err(ApiError::from(err).into()),
    }
}
