pub mod routes;

use crate::config::{AcceleratorType, Config, SchedulingMode};
use k8s_openapi::api::core::v1::Pod;
use kind::Kind;
use kube::ResourceExt;
use result::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Kind, Clone, Eq, PartialEq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Free,
    Used,
    Full,
}

#[derive(Serialize, Kind, Clone, Debug)]
pub struct Occupant {
    pub namespace: String,
    pub pod: String,
}

#[derive(Serialize, Kind, Clone, Debug)]
pub struct DeviceSlot {
    pub index: u32,
    pub status: SlotStatus,
    #[serde(rename = "currentShare")]
    pub current_share: u32,
    pub occupants: Vec<Occupant>,
    pub utilization: f64,
}

#[derive(Serialize, Kind, Clone, Debug)]
pub struct NodeGroup {
    pub node: String,
    #[serde(rename = "totalDevices")]
    pub total_devices: u32,
    #[serde(rename = "usedDevices")]
    pub used_devices: u32,
    pub replicas: u32,
    pub slots: Vec<DeviceSlot>,
}

#[derive(Serialize, Kind, Clone, Debug)]
pub struct AcceleratorGroup {
    #[serde(rename = "type")]
    pub kind: String,
    pub nodes: Vec<NodeGroup>,
    #[serde(rename = "totalDevices")]
    pub total_devices: u32,
    #[serde(rename = "usedDevices")]
    pub used_devices: u32,
}

#[derive(Serialize, Kind, Clone)]
pub struct Summary {
    pub total: u32,
    pub used: u32,
}

#[derive(Serialize, Kind, Clone)]
pub struct GpuOverview {
    #[serde(rename = "acceleratorGroups")]
    pub accelerator_groups: Vec<AcceleratorGroup>,
    pub summary: Summary,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    #[serde(rename = "prometheusEnabled")]
    pub prometheus_enabled: bool,
    #[serde(rename = "schedulingMode")]
    pub scheduling_mode: SchedulingMode,
    #[serde(rename = "maxPodsPerGPU")]
    pub max_pods_per_gpu: u32,
}

/// A device occupant observed from one of the three sources in §4.5's
/// occupancy-fusion priority list, keyed by `{namespace}/{pod}` for
/// duplicate detection across sources.
#[derive(Clone, Debug)]
struct Placement {
    namespace: String,
    pod: String,
    node: String,
    device_index: u32,
}

#[derive(Deserialize)]
struct PrometheusVectorResponse {
    data: PrometheusData,
}

#[derive(Deserialize)]
struct PrometheusData {
    result: Vec<PrometheusSample>,
}

#[derive(Deserialize)]
struct PrometheusSample {
    metric: HashMap<String, String>,
    value: (f64, String),
}

/// Queries Prometheus for the configured metric of a single accelerator
/// type. Returns `(placements, utilization-by-(node,device))`. A missing or
/// unreachable `prometheusURL` degrades to no metrics samples, which pushes
/// the fusion logic to the lower-priority sources per §4.5.
async fn query_metrics(
    prometheus_url: &str,
    accelerator: &AcceleratorType,
) -> (Vec<Placement>, HashMap<(String, u32), f64>) {
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/query", prometheus_url);
    let resp = client
        .get(&url)
        .query(&[("query", accelerator.metric_name.as_str())])
        .send()
        .await
        .ok();
    let Some(resp) = resp else {
        return (vec![], HashMap::new());
    };
    let Ok(parsed) = resp.json::<PrometheusVectorResponse>().await else {
        return (vec![], HashMap::new());
    };

    let mut placements = Vec::new();
    let mut utilization = HashMap::new();
    for sample in parsed.data.result {
        let node = sample.metric.get(&accelerator.node_label).cloned().unwrap_or_default();
        let device_index = sample
            .metric
            .get(&accelerator.device_label)
            .and_then(|d| d.parse::<u32>().ok())
            .unwrap_or(0);
        let value: f64 = sample.value.1.parse().unwrap_or(0.0);
        utilization.insert((node.clone(), device_index), value);

        let pod = sample.metric.get(&accelerator.pod_label).cloned().unwrap_or_default();
        let namespace = sample
            .metric
            .get(&accelerator.namespace_label)
            .cloned()
            .unwrap_or_default();
        if !pod.is_empty() {
            placements.push(Placement {
                namespace,
                pod,
                node,
                device_index,
            });
        }
    }
    (placements, utilization)
}

/// Places pods declaring `*_VISIBLE_DEVICES` env at their comma-separated
/// indices; source 2 of §4.5's fusion priority.
fn placements_from_env(pods: &[Pod], node_name: &str, env_name: &str) -> Vec<Placement> {
    pods.iter()
        .filter(|p| p.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node_name))
        .filter_map(|p| {
            let env = p.spec.as_ref()?.containers.first()?.env.as_ref()?;
            let value = env.iter().find(|e| e.name == env_name)?.value.as_ref()?;
            if value == "all" {
                return None;
            }
            Some((p, value.clone()))
        })
        .flat_map(|(p, value)| {
            let namespace = p.namespace().unwrap_or_default();
            let pod = p.name_any();
            let node = node_name.to_string();
            value
                .split(',')
                .filter_map(|idx| idx.trim().parse::<u32>().ok())
                .map(move |device_index| Placement {
                    namespace: namespace.clone(),
                    pod: pod.clone(),
                    node: node.clone(),
                    device_index,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Sequentially fills free slots for pods declaring `gpuCount` without an
/// index; source 3 of §4.5, used only when sources 1 and 2 yielded zero
/// occupants for this node.
fn placements_sequential(pods: &[Pod], node_name: &str, total_devices: u32) -> Vec<Placement> {
    let mut next_free = 0u32;
    let mut placements = Vec::new();
    for pod in pods
        .iter()
        .filter(|p| p.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node_name))
    {
        let gpu_count: u32 = pod
            .annotations()
            .get("gpu-count")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        for _ in 0..gpu_count {
            if next_free >= total_devices {
                break;
            }
            placements.push(Placement {
                namespace: pod.namespace().unwrap_or_default(),
                pod: pod.name_any(),
                node: node_name.to_string(),
                device_index: next_free,
            });
            next_free += 1;
        }
    }
    placements
}

fn slot_status(current_share: u32, mode: SchedulingMode, max_pods_per_gpu: u32) -> SlotStatus {
    if current_share == 0 {
        SlotStatus::Free
    } else if mode == SchedulingMode::Sharing && max_pods_per_gpu > 0 && current_share >= max_pods_per_gpu {
        SlotStatus::Full
    } else {
        SlotStatus::Used
    }
}

/// Builds the full GPU overview of §4.5: per-accelerator-type node groups,
/// each with per-device slots fused from metrics, declared visible-devices
/// env, and sequential fallback, plus cluster-wide summaries.
pub async fn overview(config: &Config) -> Result<GpuOverview> {
    let nodes = k8s::node::list().await?;
    let client: kube::Api<Pod> = k8s::client::cluster().await;
    let pods = client
        .list(&kube::api::ListParams::default())
        .await
        .map_err(k8s::errors::ApiError::from)?
        .items;

    let mut accelerator_groups = Vec::new();
    let mut grand_total = 0;
    let mut grand_used = 0;

    for accelerator in &config.accelerator_types {
        let metrics = match &config.prometheus_url {
            Some(url) => Some(query_metrics(url, accelerator).await),
            None => None,
        };

        let mut node_groups = Vec::new();
        let mut type_total = 0;
        let mut type_used = 0;

        for node in &nodes {
            let name = node.name_any();
            if !node
                .labels()
                .get(&accelerator.node_label)
                .map(|v| !v.is_empty())
                .unwrap_or(false)
                && k8s::node::device_count(node, &accelerator.resource_name) == 0
            {
                continue;
            }

            let (capacity, allocatable) = k8s::node::capacity_and_allocatable(node, &accelerator.resource_name);
            let total_devices = if capacity > 0 { capacity } else { allocatable };
            if total_devices == 0 {
                continue;
            }
            let replicas = if allocatable > capacity && capacity > 0 {
                allocatable / capacity
            } else {
                1
            };

            let mut by_device: HashMap<u32, Vec<Placement>> = HashMap::new();
            let metric_placements: Vec<Placement> = metrics
                .as_ref()
                .map(|(p, _)| p.iter().filter(|pl| pl.node == name).cloned().collect())
                .unwrap_or_default();

            let env_placements = if metric_placements.is_empty() {
                placements_from_env(&pods, &name, &accelerator.visible_devices_env)
            } else {
                vec![]
            };

            let sequential_placements = if metric_placements.is_empty() && env_placements.is_empty() {
                placements_sequential(&pods, &name, total_devices)
            } else {
                vec![]
            };

            for placement in metric_placements.into_iter().chain(env_placements).chain(sequential_placements) {
                by_device.entry(placement.device_index).or_default().push(placement);
            }

            let utilization = metrics.as_ref().map(|(_, u)| u);
            let mut slots = Vec::new();
            let mut used_devices = 0;
            for index in 0..total_devices {
                let occupants: Vec<Occupant> = by_device
                    .get(&index)
                    .map(|ps| {
                        ps.iter()
                            .map(|p| Occupant {
                                namespace: p.namespace.clone(),
                                pod: p.pod.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let current_share = occupants.len() as u32;
                if current_share > 0 {
                    used_devices += 1;
                }
                let status = slot_status(current_share, config.gpu.scheduling_mode, config.gpu.max_pods_per_gpu);
                let util = utilization
                    .and_then(|u| u.get(&(name.clone(), index)))
                    .copied()
                    .unwrap_or(0.0);
                slots.push(DeviceSlot {
                    index,
                    status,
                    current_share,
                    occupants,
                    utilization: util,
                });
            }

            type_total += total_devices;
            type_used += used_devices;
            node_groups.push(NodeGroup {
                node: name,
                total_devices,
                used_devices,
                replicas,
                slots,
            });
        }

        grand_total += type_total;
        grand_used += type_used;
        accelerator_groups.push(AcceleratorGroup {
            kind: accelerator.kind.clone(),
            nodes: node_groups,
            total_devices: type_total,
            used_devices: type_used,
        });
    }

    Ok(GpuOverview {
        accelerator_groups,
        summary: Summary {
            total: grand_total,
            used: grand_used,
        },
        updated_at: chrono::Utc::now().to_rfc3339(),
        prometheus_enabled: config.prometheus_url.is_some(),
        scheduling_mode: config.gpu.scheduling_mode,
        max_pods_per_gpu: config.gpu.max_pods_per_gpu,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingMode;

    #[test]
    fn free_slot_has_zero_share() {
        assert_eq!(slot_status(0, SchedulingMode::Exclusive, 0), SlotStatus::Free);
    }

    #[test]
    fn sharing_mode_marks_full_at_capacity() {
        assert_eq!(slot_status(2, SchedulingMode::Sharing, 2), SlotStatus::Full);
        assert_eq!(slot_status(1, SchedulingMode::Sharing, 2), SlotStatus::Used);
    }

    #[test]
    fn exclusive_mode_never_reports_full() {
        assert_eq!(slot_status(5, SchedulingMode::Exclusive, 2), SlotStatus::Used);
    }
}
