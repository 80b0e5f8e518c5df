use crate::errors::ApiError;
use error::*;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::error::ErrorResponse;
use result::Result;
use std::collections::BTreeMap;
use std::iter::FromIterator;

/// Idempotently ensures the `RegistryAuthSecret` named `name` exists in
/// `namespace` carrying the given `.dockerconfigjson` payload, creating it if
/// absent and patching it in place if the credentials have changed.
pub async fn ensure_dockerconfigjson<NS: AsRef<str>, N: AsRef<str>>(
    namespace: NS,
    name: N,
    dockerconfigjson: &str,
) -> Result<()> {
    let name = name.as_ref();
    let client: Api<Secret> = crate::client::namespaced(namespace).await;
    let mut data = BTreeMap::new();
    data.insert(
        ".dockerconfigjson".to_string(),
        k8s_openapi::ByteString(dockerconfigjson.as_bytes().to_vec()),
    );
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        data: Some(data),
        ..Default::default()
    };
    match client.create(&PostParams::default(), &secret).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => client
            .patch(
                name,
                &PatchParams::default(),
                &Patch::Merge(&secret),
            )
            .await
            .map(|_| ())
            .map_err(|err| ApiError::from(err).into()),
        Err(err) => Err(ApiError::from(err).into()),
    }
}
