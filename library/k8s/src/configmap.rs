use crate::errors::ApiError;
use error::*;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::error::ErrorResponse;
use result::Result;
use std::collections::BTreeMap;

pub const USER_IMAGES_CONFIGMAP: &str = "genet-user-images";
pub const USER_IMAGES_KEY: &str = "images.json";

/// Reads a single string key out of a ConfigMap. Returns `None` when the
/// ConfigMap or key does not (yet) exist.
pub async fn get_key<NS: AsRef<str>, N: AsRef<str>, K: AsRef<str>>(
    namespace: NS,
    name: N,
    key: K,
) -> Result<Option<String>> {
    let client: Api<ConfigMap> = crate::client::namespaced(namespace).await;
    match client.get(name.as_ref()).await {
        Ok(cm) => Ok(cm
            .data
            .and_then(|mut data| data.remove(key.as_ref()))),
        Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => Ok(None),
        Err(err) => Err(ApiError::from(err).into()),
    }
}

/// Idempotently writes a single string key into a ConfigMap, creating the
/// ConfigMap if it does not yet exist.
pub async fn put_key<NS: AsRef<str>, N: AsRef<str>, K: AsRef<str>>(
    namespace: NS,
    name: N,
    key: K,
    value: String,
) -> Result<()> {
    let name = name.as_ref();
    let client: Api<ConfigMap> = crate::client::namespaced(namespace).await;
    let mut data = BTreeMap::new();
    data.insert(key.as_ref().to_string(), value);
    let cm = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };
    match client.create(&PostParams::default(), &cm).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => client
            .patch(name, &PatchParams::default(), &Patch::Merge(&cm))
            .await
            .map(|_| ())
            .map_err(|err| ApiError::from(err).into()),
        Err(err) => Err(ApiError::from(err).into()),
    }
}
