pub mod client;
pub mod configmap;
pub mod csr;
pub mod errors;
pub mod job;
pub mod namespace;
pub mod node;
pub mod pod;
pub mod pvc;
pub mod rbac;
pub mod secret;

pub use pod::PodExt;

use either::Either;
use kube::api::DeleteParams;
use kube::core::response::Status;
use kube::error::ErrorResponse;
use result::Result;

use errors::ApiError;
use k8s_openapi::api::core::v1::Pod;

/// Delete a named pod in `namespace`.
///
/// When you get a `Pod` via `Left`, your delete has started. When you get a
/// `Status` via `Right`, the object was already gone (a 404 is treated as a
/// successful no-op delete).
///
/// 4XX and 5XX status types other than "not found" are returned as an
/// `Err(Box<dyn GenetError>)`.
pub async fn delete_pod<NS: AsRef<str>, I: AsRef<str>>(
    namespace: NS,
    id: I,
) -> Result<Either<Pod, Status>> {
    let client = client::namespaced(namespace).await;
    Ok(client
        .delete(
            id.as_ref(),
            &DeleteParams {
                dry_run: false,
                grace_period_seconds: Some(60),
                propagation_policy: None,
                preconditions: None,
            },
        )
        .await
        .or_else(|result| match result {
            kube::error::Error::Api(ErrorResponse { code: 404, .. }) => {
                Ok(Either::Right(kube::core::response::Status {
                    status: "".to_string(),
                    message: "".to_string(),
                    reason: "".to_string(),
                    details: None,
                    code: 0,
                }))
            }
            err => Err(err),
        })
        .map_err(ApiError::from)?)
}
