use crate::config::Config;
use crate::errors::{Conflict, NotFound};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use either::Either;
use error::*;
use k8s::pod::PodExt;
use k8s_openapi::api::core::v1::{Event, Pod};
use kind::Kind;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use result::Result;
use serde::Serialize;

#[derive(Serialize, Kind, Clone)]
pub struct PodSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub image: Option<String>,
    #[serde(rename = "gpuType")]
    pub gpu_type: Option<String>,
    #[serde(rename = "gpuCount")]
    pub gpu_count: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
    #[serde(rename = "protectedUntil")]
    pub protected_until: Option<String>,
}

impl From<&Pod> for PodSummary {
    fn from(pod: &Pod) -> Self {
        let annotations = pod.annotations();
        Self {
            id: pod.name_any(),
            name: pod.name_any(),
            status: pod.status_projection(),
            image: annotations.get("image").cloned(),
            gpu_type: annotations.get("gpu-type").cloned(),
            gpu_count: annotations.get("gpu-count").cloned(),
            created_at: annotations.get("created-at").cloned(),
            protected_until: annotations.get("protected-until").cloned(),
        }
    }
}

/// Lists all pods owned by `identifier`, per `GET /pods`.
pub async fn list(identifier: &str) -> Result<Vec<PodSummary>> {
    let namespace = names::namespace_of(identifier);
    let client: Api<Pod> = k8s::client::namespaced(&namespace).await;
    let pods = client
        .list(&ListParams::default())
        .await
        .map_err(k8s::errors::ApiError::from)?
        .items;
    Ok(pods.iter().map(PodSummary::from).collect())
}

async fn get_pod(namespace: &str, id: &str) -> Result<Pod> {
    let client: Api<Pod> = k8s::client::namespaced(namespace).await;
    client
        .get(id)
        .await
        .map_err(|_| NotFound::new("pod", id).into())
}

pub async fn get(identifier: &str, id: &str) -> Result<PodSummary> {
    let namespace = names::namespace_of(identifier);
    let pod = get_pod(&namespace, id).await?;
    Ok(PodSummary::from(&pod))
}

#[derive(Serialize, Kind)]
pub struct ExtendResult {
    pub message: String,
    #[serde(rename = "protectedUntil")]
    pub protected_until: String,
}

/// Computes `tomorrow 22:59` in the configured timezone and writes it to the
/// `genet.io/protected-until` annotation, per §4.4's extend operation.
pub async fn extend(identifier: &str, id: &str, config: &Config) -> Result<ExtendResult> {
    let namespace = names::namespace_of(identifier);
    get_pod(&namespace, id).await?;

    let tz_offset_hours: i64 = config
        .cluster
        .timezone
        .as_deref()
        .and_then(|tz| tz.parse::<i64>().ok())
        .unwrap_or(0);
    let now = Utc::now() + chrono::Duration::hours(tz_offset_hours);
    let tomorrow = now.date_naive() + chrono::Duration::days(1);
    let protected_until_local = tomorrow.and_time(NaiveTime::from_hms_opt(22, 59, 0).unwrap());
    let protected_until = Utc.from_utc_datetime(&protected_until_local) - chrono::Duration::hours(tz_offset_hours);
    let protected_until_str = protected_until.to_rfc3339();

    let client: Api<Pod> = k8s::client::namespaced(&namespace).await;
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                "protected-until": protected_until_str,
            }
        }
    });
    client
        .patch(id, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(k8s::errors::ApiError::from)?;

    Ok(ExtendResult {
        message: "pod protected from reclamation".to_string(),
        protected_until: protected_until_str,
    })
}

#[derive(Serialize, Kind)]
pub struct LogsResult {
    pub logs: String,
}

pub async fn logs(identifier: &str, id: &str, tail: Option<i64>) -> Result<LogsResult> {
    let namespace = names::namespace_of(identifier);
    let client: Api<Pod> = k8s::client::namespaced(&namespace).await;
    let params = kube::api::LogParams {
        tail_lines: tail.or(Some(100)),
        ..Default::default()
    };
    let logs = client
        .logs(id, &params)
        .await
        .map_err(k8s::errors::ApiError::from)?;
    Ok(LogsResult { logs })
}

#[derive(Serialize, Kind)]
pub struct EventSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub message: String,
    #[serde(rename = "lastTimestamp")]
    pub last_timestamp: Option<String>,
}

#[derive(Serialize, Kind)]
pub struct EventsResult {
    pub events: Vec<EventSummary>,
}

pub async fn events(identifier: &str, id: &str) -> Result<EventsResult> {
    let namespace = names::namespace_of(identifier);
    let client: Api<Event> = k8s::client::namespaced(&namespace).await;
    let events = client
        .list(&ListParams::default().fields(&format!("involvedObject.name={}", id)))
        .await
        .map_err(k8s::errors::ApiError::from)?
        .items
        .into_iter()
        .map(|e| EventSummary {
            kind: e.type_.unwrap_or_default(),
            reason: e.reason.unwrap_or_default(),
            message: e.message.unwrap_or_default(),
            last_timestamp: e.last_timestamp.map(|t| t.0.to_rfc3339()),
        })
        .collect();
    Ok(EventsResult { events })
}

#[derive(Serialize, Kind)]
pub struct DescribeResult {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub node: Option<String>,
    #[serde(rename = "podIP")]
    pub pod_ip: Option<String>,
    pub annotations: std::collections::BTreeMap<String, String>,
    pub labels: std::collections::BTreeMap<String, String>,
}

pub async fn describe(identifier: &str, id: &str) -> Result<DescribeResult> {
    let namespace = names::namespace_of(identifier);
    let pod = get_pod(&namespace, id).await?;
    Ok(DescribeResult {
        name: pod.name_any(),
        namespace: namespace.clone(),
        status: pod.status_projection(),
        node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        pod_ip: pod.status.as_ref().and_then(|s| s.pod_ip.clone()),
        annotations: pod.annotations().clone(),
        labels: pod.labels().clone(),
    })
}

/// Deletes a pod per §4.4: refuses (409) while the newest commit job for the
/// pod is non-terminal, then deletes the pod and any user-scope PVC whose
/// `reclaimPolicy` is `Delete`.
pub async fn delete(identifier: &str, id: &str, config: &Config) -> Result<()> {
    let namespace = names::namespace_of(identifier);
    get_pod(&namespace, id).await?;

    let jobs = k8s::job::list_for_pod(&namespace, id).await?;
    if let Some(newest) = jobs.first() {
        let status = k8s::job::project_status(newest);
        if k8s::job::is_active(&status.phase) {
            return Err(Conflict {
                reason: "a commit job for this pod is still active".to_string(),
            }
            .into());
        }
    }

    match k8s::delete_pod(&namespace, id).await? {
        Either::Left(_) | Either::Right(_) => {}
    }

    for volume in &config.storage.volumes {
        if volume.reclaim_policy != crate::config::ReclaimPolicy::Delete {
            continue;
        }
        let claim_name = match volume.scope {
            crate::config::VolumeScope::User => names::user_volume_name(identifier),
            crate::config::VolumeScope::Pod => names::pod_volume_name(id, &volume.name),
        };
        k8s::pvc::delete(&namespace, &claim_name).await?;
    }
    Ok(())
}
