use crate::errors::ApiError;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams};
use result::Result;

/// Lists every node in the cluster, used by admission's node/device checks
/// (§4.3) and the GPU overview's per-node capacity fusion (§4.5).
pub async fn list() -> Result<Vec<Node>> {
    let client: Api<Node> = crate::client::cluster().await;
    Ok(client
        .list(&ListParams::default())
        .await
        .map_err(ApiError::from)?
        .items)
}

/// Parses a `Quantity` resource value (e.g. "4", "4Gi") as an integer count,
/// returning `0` if absent or unparseable. Used for GPU device counts, which
/// are always reported as whole numbers by device plugins.
pub fn quantity_as_u32(quantity: Option<&Quantity>) -> u32 {
    quantity
        .and_then(|q| q.0.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

/// Returns `Capacity[resourceName]`, falling back to `Allocatable[resourceName]`
/// when capacity is absent, per §4.5's "prefer Capacity... fall back to
/// Allocatable if capacity is absent".
pub fn device_count(node: &Node, resource_name: &str) -> u32 {
    let status = node.status.clone().unwrap_or_default();
    let capacity = status
        .capacity
        .as_ref()
        .and_then(|c| c.get(resource_name))
        .map(|q| quantity_as_u32(Some(q)));
    match capacity {
        Some(count) if count > 0 => count,
        _ => status
            .allocatable
            .as_ref()
            .and_then(|a| a.get(resource_name))
            .map(|q| quantity_as_u32(Some(q)))
            .unwrap_or(0),
    }
}

/// Returns `(capacity, allocatable)` for a resource name, used to detect
/// time-slicing (`Allocatable/Capacity` ratio) per §4.5.
pub fn capacity_and_allocatable(node: &Node, resource_name: &str) -> (u32, u32) {
    let status = node.status.clone().unwrap_or_default();
    let capacity = status
        .capacity
        .as_ref()
        .and_then(|c| c.get(resource_name))
        .map(|q| quantity_as_u32(Some(q)))
        .unwrap_or(0);
    let allocatable = status
        .allocatable
        .as_ref()
        .and_then(|a| a.get(resource_name))
        .map(|q| quantity_as_u32(Some(q)))
        .unwrap_or(0);
    (capacity, allocatable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_parsing() {
        assert_eq!(quantity_as_u32(Some(&Quantity("4".to_string()))), 4);
        assert_eq!(quantity_as_u32(None), 0);
        assert_eq!(quantity_as_u32(Some(&Quantity("bogus".to_string()))), 0);
    }
}
