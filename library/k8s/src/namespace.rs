use crate::errors::ApiError;
use error::*;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, PostParams};
use kube::error::ErrorResponse;
use result::Result;
use std::collections::BTreeMap;
use std::iter::FromIterator;

/// Idempotently ensures the `UserNamespace` named `name` exists, labeled
/// `genet.io/managed=true`. "Already exists" is treated as success, per §7's
/// policy that every ensure-step is idempotent on retry.
pub async fn ensure<N: AsRef<str>>(name: N) -> Result<()> {
    let name = name.as_ref();
    let client: Api<Namespace> = crate::client::cluster().await;
    let ns = Namespace {
        metadata: kube::api::ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from_iter([(
                "genet.io/managed".to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    };
    match client.create(&PostParams::default(), &ns).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ErrorResponse { code: 409, .. })) => Ok(()),
        Err(err) => Err(ApiError::from(err).into()),
    }
}
