use crate::config::{Config, VolumeScope, VolumeType};
use crate::errors::{InvalidInput, QuotaExceeded};
use error::*;
use k8s::pod::{PodSpecInput, VolumeMount};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams, PostParams};
use kube::error::ErrorResponse;
use kube::ResourceExt;
use regex::Regex;
use result::Result;
use serde::Deserialize;
use term_colors::cyan;

lazy_static! {
    static ref IMAGE_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._\-/:]*[a-zA-Z0-9]$").unwrap();
    static ref CPU_RE: Regex = Regex::new(r"^[0-9]+(\.[0-9]+)?m?$").unwrap();
    static ref MEMORY_RE: Regex = Regex::new(r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti)?$").unwrap();
}

#[derive(Deserialize, Debug)]
pub struct CreatePodRequest {
    pub image: String,
    #[serde(rename = "gpuType")]
    pub gpu_type: Option<String>,
    #[serde(rename = "gpuCount", default)]
    pub gpu_count: u32,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    #[serde(rename = "nodeName")]
    pub node_name: Option<String>,
    #[serde(rename = "gpuDevices", default)]
    pub gpu_devices: Vec<u32>,
    pub name: Option<String>,
}

fn validate_image(image: &str) -> Result<()> {
    if !IMAGE_RE.is_match(image) || image.contains("..") || image.contains("//") {
        return Err(InvalidInput::new("image", format!("'{}' is not a valid image reference", image)).into());
    }
    Ok(())
}

fn normalized_cpu(cpu: &str) -> Result<f64> {
    if !CPU_RE.is_match(cpu) {
        return Err(InvalidInput::new("cpu", format!("'{}' does not match the expected format", cpu)).into());
    }
    let value = if let Some(millis) = cpu.strip_suffix('m') {
        millis.parse::<f64>().unwrap_or(0.0) / 1000.0
    } else {
        cpu.parse::<f64>().unwrap_or(0.0)
    };
    if value <= 0.0 || value > 128.0 {
        return Err(InvalidInput::new("cpu", format!("'{}' must normalize into (0, 128]", cpu)).into());
    }
    Ok(value)
}

fn validate_memory(memory: &str) -> Result<()> {
    if !MEMORY_RE.is_match(memory) {
        return Err(InvalidInput::new("memory", format!("'{}' does not match the expected format", memory)).into());
    }
    Ok(())
}

fn validate_custom_name(suffix: &str) -> Result<()> {
    if !names::valid_custom_suffix(suffix) {
        return Err(InvalidInput::new("name", format!("'{}' is not a valid pod name suffix", suffix)).into());
    }
    Ok(())
}

/// Everything the admission engine resolved, ready to hand to [k8s::pod::new].
pub struct AdmissionPlan {
    pub pod_name: String,
    pub namespace: String,
    pub image: String,
    pub cpu: String,
    pub memory: String,
    pub gpu_type: Option<String>,
    pub gpu_count: u32,
    pub gpu_devices: Vec<u32>,
    pub gpu_resource_name: Option<String>,
    pub gpu_visible_devices_env: Option<String>,
    pub node_name: Option<String>,
}

/// Validates `req` per §4.3 and resolves every field needed to build the pod
/// object, without yet talking to the cluster (quota/node checks happen in
/// [check_quota] and [check_node_and_devices]).
pub fn validate(
    req: &CreatePodRequest,
    config: &Config,
    identifier: &str,
) -> Result<AdmissionPlan> {
    validate_image(&req.image)?;
    let cpu = req.cpu.clone().unwrap_or_else(|| "1".to_string());
    normalized_cpu(&cpu)?;
    let memory = req.memory.clone().unwrap_or_else(|| "2Gi".to_string());
    validate_memory(&memory)?;
    if req.gpu_count > 8 {
        return Err(InvalidInput::new("gpuCount", "must be within [0, 8]").into());
    }

    let mut gpu_count = req.gpu_count;
    if !req.gpu_devices.is_empty() {
        if req.node_name.is_none() {
            return Err(InvalidInput::new("nodeName", "is mandatory when gpuDevices is non-empty").into());
        }
        gpu_count = req.gpu_devices.len() as u32;
    }

    let accelerator = match &req.gpu_type {
        Some(gpu_type) => {
            let accel = config
                .gpu_resource_name_for(gpu_type)
                .ok_or_else(|| InvalidInput::new("gpuType", format!("'{}' is not a configured GPU type", gpu_type)))?;
            Some(accel)
        }
        None => None,
    };

    let suffix = match &req.name {
        Some(name) => {
            validate_custom_name(name)?;
            name.clone()
        }
        None => std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string(),
    };
    let pod_name = names::pod_name(identifier, &suffix);
    let namespace = names::namespace_of(identifier);

    Ok(AdmissionPlan {
        pod_name,
        namespace,
        image: req.image.clone(),
        cpu,
        memory,
        gpu_type: req.gpu_type.clone(),
        gpu_count,
        gpu_devices: req.gpu_devices.clone(),
        gpu_resource_name: accelerator.map(|a| a.resource_name.clone()),
        gpu_visible_devices_env: accelerator.map(|a| a.visible_devices_env.clone()),
        node_name: req.node_name.clone(),
    })
}

/// Enforces §4.3's quota rule: `P+1 > podLimitPerUser` or `G + requestedGpu >
/// gpuLimitPerUser` is rejected with 403. Admission across users is
/// intentionally not serialized (§5): this check races benignly.
pub async fn check_quota(config: &Config, identifier: &str, requested_gpu: u32) -> Result<()> {
    let namespace = names::namespace_of(identifier);
    let client: Api<Pod> = k8s::client::namespaced(&namespace).await;
    let pods = match client.list(&ListParams::default()).await {
        Ok(list) => list.items,
        Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => vec![],
        Err(err) => return Err(k8s::errors::ApiError::from(err).into()),
    };

    let pod_count = pods.len() as u32;
    let gpu_used: u32 = pods
        .iter()
        .filter_map(|p| p.annotations().get("gpu-count"))
        .filter_map(|v| v.parse::<u32>().ok())
        .sum();

    if pod_count + 1 > config.pod_limit_per_user {
        warn!(
            "Rejecting pod admission for {}: pod quota {} exceeded",
            cyan(identifier),
            config.pod_limit_per_user
        );
        return Err(QuotaExceeded {
            resource: "pods".to_string(),
            limit: config.pod_limit_per_user,
        }
        .into());
    }
    if gpu_used + requested_gpu > config.gpu_limit_per_user {
        warn!(
            "Rejecting pod admission for {}: GPU quota {} exceeded",
            cyan(identifier),
            config.gpu_limit_per_user
        );
        return Err(QuotaExceeded {
            resource: "GPUs".to_string(),
            limit: config.gpu_limit_per_user,
        }
        .into());
    }
    Ok(())
}

/// Enforces §4.3's node/device checks: when `nodeName` is given, the node
/// must exist and (if GPUs requested) have enough allocatable devices; each
/// requested device index must be within range.
pub async fn check_node_and_devices(plan: &AdmissionPlan) -> Result<()> {
    let Some(node_name) = &plan.node_name else {
        return Ok(());
    };
    let client: Api<Node> = k8s::client::cluster().await;
    let node = client
        .get(node_name)
        .await
        .map_err(|_| InvalidInput::new("nodeName", format!("node '{}' does not exist", node_name)))?;

    if plan.gpu_count > 0 {
        let resource_name = plan
            .gpu_resource_name
            .as_deref()
            .unwrap_or("nvidia.com/gpu");
        let allocatable = k8s::node::device_count(&node, resource_name);
        if allocatable < plan.gpu_count {
            return Err(InvalidInput::new(
                "gpuCount",
                format!("node '{}' only has {} allocatable devices", node_name, allocatable),
            )
            .into());
        }
        for device in &plan.gpu_devices {
            if *device >= allocatable {
                return Err(InvalidInput::new(
                    "gpuDevices",
                    format!("device index {} is out of range for node '{}'", device, node_name),
                )
                .into());
            }
        }
    }
    Ok(())
}

/// Resolves the [VolumeMount] list for a pod from the storage configuration:
/// user-scope volumes ensure (or reuse) a PVC named `{identifier}-workspace`;
/// pod-scope volumes ensure one named `{podName}-{volumeName}` per pod.
pub async fn provision_volumes(
    config: &Config,
    identifier: &str,
    namespace: &str,
    pod_name: &str,
) -> Result<Vec<VolumeMount>> {
    let mut mounts = Vec::new();
    for volume in &config.storage.volumes {
        let claim_name = match volume.scope {
            VolumeScope::User => names::user_volume_name(identifier),
            VolumeScope::Pod => names::pod_volume_name(pod_name, &volume.name),
        };
        match volume.kind {
            VolumeType::Pvc => {
                k8s::pvc::ensure(
                    namespace,
                    &claim_name,
                    volume.storage_class.as_deref(),
                    volume.size.as_deref().unwrap_or("10Gi"),
                    volume.access_mode.as_deref().unwrap_or("ReadWriteOnce"),
                )
                .await?;
                mounts.push(VolumeMount {
                    claim_name,
                    mount_path: volume.mount_path.clone(),
                    host_path: false,
                });
            }
            VolumeType::Hostpath => mounts.push(VolumeMount {
                claim_name,
                mount_path: volume.mount_path.clone(),
                host_path: true,
            }),
        }
    }
    Ok(mounts)
}

/// Runs the full admission pipeline of §4.3: validate, quota, node/device
/// checks, then idempotently provision namespace/PVCs/pod.
pub async fn admit(req: &CreatePodRequest, config: &Config, identifier: &str) -> Result<Pod> {
    let plan = validate(req, config, identifier)?;
    check_quota(config, identifier, plan.gpu_count).await?;
    check_node_and_devices(&plan).await?;

    k8s::namespace::ensure(&plan.namespace).await?;
    let volumes = provision_volumes(config, identifier, &plan.namespace, &plan.pod_name).await?;

    let pod_spec = PodSpecInput {
        name: &plan.pod_name,
        namespace: &plan.namespace,
        image: &plan.image,
        user_identifier: identifier,
        cpu: &plan.cpu,
        memory: &plan.memory,
        gpu_resource_name: plan.gpu_resource_name.as_deref(),
        gpu_count: plan.gpu_count,
        gpu_devices: &plan.gpu_devices,
        gpu_type: plan.gpu_type.as_deref(),
        gpu_visible_devices_env: plan.gpu_visible_devices_env.as_deref(),
        node_name: plan.node_name.as_deref(),
        volumes: &volumes,
    };
    let pod = k8s::pod::new(&pod_spec)?;

    let client: Api<Pod> = k8s::client::namespaced(&plan.namespace).await;
    let created = client
        .create(&PostParams::default(), &pod)
        .await
        .map_err(|err| k8s::errors::ApiError::from(err))?;
    info!(
        "Admitted pod {} for {} in namespace {}",
        cyan(&plan.pod_name),
        cyan(identifier),
        cyan(&plan.namespace)
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn req() -> CreatePodRequest {
        CreatePodRequest {
            image: "docker.io/library/ubuntu:22.04".to_string(),
            gpu_type: None,
            gpu_count: 0,
            cpu: Some("2".to_string()),
            memory: Some("4Gi".to_string()),
            node_name: None,
            gpu_devices: vec![],
            name: None,
        }
    }

    #[test]
    fn rejects_bad_image() {
        let mut r = req();
        r.image = "../escape".to_string();
        let config = test_config();
        assert!(validate(&r, &config, "zhang-san-zs").is_err());
    }

    #[test]
    fn requires_node_name_with_gpu_devices() {
        let mut r = req();
        r.gpu_devices = vec![0, 2];
        let config = test_config();
        let err = validate(&r, &config, "zhang-san-zs").unwrap_err();
        assert_eq!(err.http_code(), rocket::http::Status::BadRequest);
    }

    #[test]
    fn gpu_count_overridden_by_device_list() {
        let mut r = req();
        r.node_name = Some("node-a".to_string());
        r.gpu_devices = vec![0, 2];
        let config = test_config();
        let plan = validate(&r, &config, "zhang-san-zs").unwrap();
        assert_eq!(plan.gpu_count, 2);
    }

    #[test]
    fn rejects_unconfigured_gpu_type() {
        let mut r = req();
        r.gpu_type = Some("h100".to_string());
        let config = test_config();
        assert!(validate(&r, &config, "zhang-san-zs").is_err());
    }

    #[test]
    fn cpu_out_of_range_is_rejected() {
        assert!(normalized_cpu("0").is_err());
        assert!(normalized_cpu("129").is_err());
        assert!(normalized_cpu("500m").is_ok());
    }
}
