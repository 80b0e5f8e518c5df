use chrono::Utc;
use error::*;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateTerminated, ContainerStateWaiting, Pod, PodStatus,
};
use result::Result;
use serde_json;

#[derive(GenetError, Error, Kind, HttpCode, Debug)]
#[error(
    "Failed to serialize a Kubernetes pod resource with the name '{name}' and image \
    reference '{reference}'. This is very peculiar; it may work if you simply retry."
)]
#[code(Status::InternalServerError)]
pub struct PodSerializationError {
    name: String,
    reference: String,
    #[source]
    source: serde_json::Error,
}

/// A VolumeMount names a PVC (or hostPath, for the `WorkspaceVolume` type `hostpath`)
/// and the path it is mounted at inside the workspace container.
pub struct VolumeMount {
    pub claim_name: String,
    pub mount_path: String,
    pub host_path: bool,
}

/// Everything the admission engine has already validated and resolved before a
/// pod object is built. Building a [Pod] from this struct never fails for
/// reasons of user input; only serialization of the assembled JSON can fail.
pub struct PodSpecInput<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub image: &'a str,
    pub user_identifier: &'a str,
    pub cpu: &'a str,
    pub memory: &'a str,
    pub gpu_resource_name: Option<&'a str>,
    pub gpu_count: u32,
    pub gpu_devices: &'a [u32],
    pub gpu_type: Option<&'a str>,
    pub gpu_visible_devices_env: Option<&'a str>,
    pub node_name: Option<&'a str>,
    pub volumes: &'a [VolumeMount],
}

/// Builds the `UserPod` object described by §3/§4.3: annotations carrying
/// `created-at`, `image`, `gpu-type`, `gpu-count`, `cpu`, `memory`, and (when
/// device-pinned) `genet.io/gpu-devices`; labels `genet.io/user`,
/// `genet.io/managed=true`, `app={name}`.
pub fn new(input: &PodSpecInput) -> Result<Pod> {
    let mut annotations = serde_json::Map::new();
    annotations.insert(
        "created-at".to_string(),
        serde_json::Value::String(Utc::now().to_rfc3339()),
    );
    annotations.insert(
        "image".to_string(),
        serde_json::Value::String(input.image.to_string()),
    );
    annotations.insert(
        "cpu".to_string(),
        serde_json::Value::String(input.cpu.to_string()),
    );
    annotations.insert(
        "memory".to_string(),
        serde_json::Value::String(input.memory.to_string()),
    );
    if let Some(gpu_type) = input.gpu_type {
        annotations.insert(
            "gpu-type".to_string(),
            serde_json::Value::String(gpu_type.to_string()),
        );
    }
    annotations.insert(
        "gpu-count".to_string(),
        serde_json::Value::String(input.gpu_count.to_string()),
    );
    if !input.gpu_devices.is_empty() {
        let joined = input
            .gpu_devices
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        annotations.insert(
            "genet.io/gpu-devices".to_string(),
            serde_json::Value::String(joined),
        );
    }

    let mut env = vec![serde_json::json!({"name": "PORT", "value": "8080"})];
    if let Some(visible) = input.gpu_visible_devices_env {
        env.push(serde_json::json!({"name": visible, "value":
            if input.gpu_devices.is_empty() {
                "all".to_string()
            } else {
                input.gpu_devices.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(",")
            }
        }));
    }

    let mut resources = serde_json::json!({
        "requests": {"cpu": input.cpu, "memory": input.memory},
        "limits": {"cpu": input.cpu, "memory": input.memory},
    });
    if let Some(gpu_resource) = input.gpu_resource_name {
        if input.gpu_count > 0 {
            resources["requests"][gpu_resource] = serde_json::json!(input.gpu_count.to_string());
            resources["limits"][gpu_resource] = serde_json::json!(input.gpu_count.to_string());
        }
    }

    let volume_mounts: Vec<serde_json::Value> = input
        .volumes
        .iter()
        .map(|v| serde_json::json!({"name": sanitize_volume_name(&v.claim_name), "mountPath": v.mount_path}))
        .collect();
    let volumes: Vec<serde_json::Value> = input
        .volumes
        .iter()
        .map(|v| {
            if v.host_path {
                serde_json::json!({"name": sanitize_volume_name(&v.claim_name), "hostPath": {"path": v.mount_path}})
            } else {
                serde_json::json!({"name": sanitize_volume_name(&v.claim_name), "persistentVolumeClaim": {"claimName": v.claim_name}})
            }
        })
        .collect();

    let mut pod_json = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": input.name,
            "namespace": input.namespace,
            "annotations": annotations,
            "labels": {
                "genet.io/user": input.user_identifier,
                "genet.io/managed": "true",
                "app": input.name,
            },
        },
        "spec": {
            "restartPolicy": "Never",
            "containers": [
                {
                    "name": input.name,
                    "image": input.image,
                    "imagePullPolicy": "IfNotPresent",
                    "env": env,
                    "ports": [{"containerPort": 8080, "protocol": "TCP"}],
                    "resources": resources,
                    "volumeMounts": volume_mounts,
                }
            ],
            "volumes": volumes,
        }
    });
    if let Some(node_name) = input.node_name {
        pod_json["spec"]["nodeName"] = serde_json::json!(node_name);
    }

    serde_json::from_value(pod_json).map_err(|source| {
        PodSerializationError {
            name: input.name.to_string(),
            reference: input.image.to_string(),
            source,
        }
        .into()
    })
}

fn sanitize_volume_name(claim: &str) -> String {
    names::sanitize(claim, 63)
}

/// PodExt is an extension trait used to answer common questions about the
/// status of a workspace pod, mirroring the projection rules of §4.4.
pub trait PodExt {
    fn running(&self) -> bool;
    fn crashed(&self) -> bool;
    fn terminated(&self) -> bool;
    fn terminating(&self) -> bool;
    fn terminated_reason(&self) -> Option<String>;
    fn terminated_message(&self) -> Option<String>;
    fn waiting_reason(&self) -> Option<String>;
    fn init_failure_reason(&self) -> Option<String>;
    fn was_err_image_pull(&self) -> bool;
    fn err_image_pull(&self) -> Result<()>;
    /// Projects the single "status" string per the ordered rule of §4.4:
    /// Terminating, then waiting reason, then terminated reason, then
    /// init-container failure as `Init:…`, else `pod.Status.Phase`.
    fn status_projection(&self) -> String;
}

impl PodExt for Pod {
    fn running(&self) -> bool {
        container_statuses(self)
            .iter()
            .any(|status| state(status).running.is_some())
    }

    fn terminated(&self) -> bool {
        container_statuses(self)
            .iter()
            .any(|status| state(status).terminated.is_some())
    }

    fn terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn was_err_image_pull(&self) -> bool {
        waiting_reason_matching(self, "ErrImagePull").is_some()
    }

    fn err_image_pull(&self) -> Result<()> {
        if let Some(message) = waiting_message_for(self, "ErrImagePull") {
            Err(ErrImagePull {
                message: ErrImagePullCause { message },
            }
            .into())
        } else {
            Ok(())
        }
    }

    fn crashed(&self) -> bool {
        waiting_reason_matching(self, "CrashLoopBackOff").is_some()
    }

    fn terminated_reason(&self) -> Option<String> {
        container_statuses(self)
            .iter()
            .find_map(|status| match &state(status).terminated {
                Some(ContainerStateTerminated {
                    reason: Some(reason),
                    ..
                }) => Some(reason.clone()),
                _ => None,
            })
    }

    fn terminated_message(&self) -> Option<String> {
        container_statuses(self)
            .iter()
            .find_map(|status| match &state(status).terminated {
                Some(ContainerStateTerminated {
                    message: Some(message),
                    ..
                }) => Some(message.clone()),
                _ => None,
            })
    }

    fn waiting_reason(&self) -> Option<String> {
        container_statuses(self)
            .iter()
            .find_map(|status| match &state(status).waiting {
                Some(ContainerStateWaiting {
                    reason: Some(reason),
                    ..
                }) => Some(reason.clone()),
                _ => None,
            })
    }

    fn init_failure_reason(&self) -> Option<String> {
        let default_status = PodStatus::default();
        let default_statuses = vec![];
        self.status
            .as_ref()
            .unwrap_or(&default_status)
            .init_container_statuses
            .as_ref()
            .unwrap_or(&default_statuses)
            .iter()
            .find_map(|status| match &state(status).terminated {
                Some(ContainerStateTerminated {
                    reason: Some(reason),
                    exit_code,
                    ..
                }) if *exit_code != 0 => Some(reason.clone()),
                _ => match &state(status).waiting {
                    Some(ContainerStateWaiting {
                        reason: Some(reason),
                        ..
                    }) => Some(reason.clone()),
                    _ => None,
                },
            })
    }

    fn status_projection(&self) -> String {
        if self.terminating() {
            return "Terminating".to_string();
        }
        if let Some(reason) = self.waiting_reason() {
            return reason;
        }
        if let Some(reason) = self.terminated_reason() {
            return reason;
        }
        if let Some(reason) = self.init_failure_reason() {
            return format!("Init:{}", reason);
        }
        self.status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

fn container_statuses(pod: &Pod) -> Vec<k8s_openapi::api::core::v1::ContainerStatus> {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.clone())
        .unwrap_or_default()
}

fn state(status: &k8s_openapi::api::core::v1::ContainerStatus) -> ContainerState {
    status.state.clone().unwrap_or_default()
}

fn waiting_reason_matching(pod: &Pod, reason: &str) -> Option<()> {
    container_statuses(pod)
        .iter()
        .find(|status| match &state(status).waiting {
            Some(ContainerStateWaiting {
                reason: Some(r), ..
            }) => r == reason,
            _ => false,
        })
        .map(|_| ())
}

fn waiting_message_for(pod: &Pod, reason: &str) -> Option<String> {
    container_statuses(pod)
        .iter()
        .find_map(|status| match &state(status).waiting {
            Some(ContainerStateWaiting {
                reason: Some(r),
                message: Some(m),
                ..
            }) if r == reason => Some(m.clone()),
            _ => None,
        })
}

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error(
    "The image for the pod failed to get pulled from the configured image registry. Perhaps \
    the image doesn't exist or the connection to the registry couldn't be established?"
)]
#[code(error::Status::NotFound)]
struct ErrImagePull {
    #[source]
    message: ErrImagePullCause,
}

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("{message}")]
#[code(error::Status::NotFound)]
struct ErrImagePullCause {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(name: &'a str) -> PodSpecInput<'a> {
        PodSpecInput {
            name,
            namespace: "user-zhang-san-zs",
            image: "docker.io/library/ubuntu:22.04",
            user_identifier: "zhang-san-zs",
            cpu: "2",
            memory: "4Gi",
            gpu_resource_name: Some("nvidia.com/gpu"),
            gpu_count: 2,
            gpu_devices: &[0, 2],
            gpu_type: Some("a100"),
            gpu_visible_devices_env: Some("NVIDIA_VISIBLE_DEVICES"),
            node_name: Some("node-a"),
            volumes: &[],
        }
    }

    #[test]
    fn builds_basic_pod() {
        let pod = new(&input("pod-zhang-san-zs-1700000000")).unwrap();
        assert_eq!(pod.metadata.name.unwrap(), "pod-zhang-san-zs-1700000000");
        let annotations = pod.metadata.annotations.unwrap();
        assert_eq!(annotations.get("genet.io/gpu-devices").unwrap(), "0,2");
        assert_eq!(annotations.get("gpu-count").unwrap(), "2");
    }

    #[test]
    fn gpu_device_env_matches_devices() {
        let pod = new(&input("pod-x")).unwrap();
        let container = &pod.spec.unwrap().containers[0];
        let env = container.env.as_ref().unwrap();
        let visible = env.iter().find(|e| e.name == "NVIDIA_VISIBLE_DEVICES").unwrap();
        assert_eq!(visible.value.as_deref(), Some("0,2"));
    }
}
