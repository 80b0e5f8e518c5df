pub mod routes;

use crate::config::Config;
use crate::errors::{Conflict, InvalidInput, NotFound};
use k8s::job::{CommitJobInput, JobPhase, JobStatusProjection};
use k8s::pod::PodExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kind::Kind;
use kube::api::{Api, ListParams};
use kube::ResourceExt;
use result::Result;
use serde::{Deserialize, Serialize};
use term_colors::cyan;

#[derive(Deserialize, Debug)]
pub struct CommitRequest {
    #[serde(rename = "imageName")]
    pub image_name: String,
}

#[derive(Serialize, Kind)]
pub struct CommitStarted {
    pub message: String,
    #[serde(rename = "jobName")]
    pub job_name: String,
    #[serde(rename = "targetImage")]
    pub target_image: String,
}

async fn active_job(namespace: &str, pod: &str) -> Result<Option<Job>> {
    let jobs = k8s::job::list_for_pod(namespace, pod).await?;
    Ok(jobs.into_iter().find(|j| {
        let status = k8s::job::project_status(j);
        k8s::job::is_active(&status.phase)
    }))
}

/// Starts a commit job for `id`, per §4.6. Requires the target pod to be
/// `Running` and refuses while a prior commit job for the same pod is
/// still active.
pub async fn start(identifier: &str, id: &str, req: &CommitRequest, config: &Config) -> Result<CommitStarted> {
    if req.image_name.trim().is_empty() {
        return Err(InvalidInput::new("imageName", "must not be empty").into());
    }
    let namespace = names::namespace_of(identifier);
    let client: Api<Pod> = k8s::client::namespaced(&namespace).await;
    let pod = client
        .get(id)
        .await
        .map_err(|_| NotFound::new("pod", id))?;
    if pod.status_projection() != "Running" {
        return Err(InvalidInput::new("pod", "must be Running to commit").into());
    }

    if active_job(&namespace, id).await?.is_some() {
        return Err(Conflict {
            reason: "a commit job for this pod is already active".to_string(),
        }
        .into());
    }

    let node_name = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_name.clone())
        .ok_or_else(|| InvalidInput::new("pod", "is not yet bound to a node"))?;

    let unix_second = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let job_name = names::job_name(identifier, unix_second);

    let registry_auth_secret = if config.registry.enabled {
        let secret_name = format!("registry-auth-{}", identifier);
        let dockerconfigjson = build_dockerconfigjson(config);
        k8s::secret::ensure_dockerconfigjson(&namespace, &secret_name, &dockerconfigjson).await?;
        Some(secret_name)
    } else {
        None
    };

    let input = CommitJobInput {
        name: &job_name,
        namespace: &namespace,
        node_name: &node_name,
        source_pod: id,
        user_identifier: identifier,
        target_image: &req.image_name,
        commit_image: &config.registry.commit_image,
        registry_auth_secret: registry_auth_secret.as_deref(),
        insecure_registry: config.registry.insecure_registry,
    };
    k8s::job::create(&input).await?;
    info!(
        "Started commit job {} for pod {} -> {}",
        cyan(&job_name),
        cyan(id),
        cyan(&req.image_name)
    );

    Ok(CommitStarted {
        message: "commit job started".to_string(),
        job_name,
        target_image: req.image_name.clone(),
    })
}

fn build_dockerconfigjson(config: &Config) -> String {
    let server = config.registry.server.clone().unwrap_or_default();
    let username = config.registry.username.clone().unwrap_or_default();
    let password = config
        .registry
        .password
        .as_ref()
        .map(|s| s.raw_secret().to_string())
        .unwrap_or_default();
    let auth = base64::encode(format!("{}:{}", username, password));
    let mut auths = serde_json::Map::new();
    auths.insert(
        server,
        serde_json::json!({
            "username": username,
            "password": password,
            "auth": auth,
        }),
    );
    serde_json::json!({ "auths": auths }).to_string()
}

#[derive(Serialize, Kind)]
pub struct CommitStatus {
    #[serde(rename = "hasJob")]
    pub has_job: bool,
    #[serde(rename = "jobName")]
    pub job_name: Option<String>,
    pub status: Option<JobPhase>,
    pub message: Option<String>,
    #[serde(rename = "startTime")]
    pub start_time: Option<String>,
    #[serde(rename = "endTime")]
    pub end_time: Option<String>,
}

/// Reports the newest commit job's status for `id`, per §4.6's "selection
/// for status/logs is newest by creation timestamp".
pub async fn status(identifier: &str, id: &str) -> Result<CommitStatus> {
    let namespace = names::namespace_of(identifier);
    let jobs = k8s::job::list_for_pod(&namespace, id).await?;
    let Some(newest) = jobs.first() else {
        return Ok(CommitStatus {
            has_job: false,
            job_name: None,
            status: None,
            message: None,
            start_time: None,
            end_time: None,
        });
    };
    let projection: JobStatusProjection = k8s::job::project_status(newest);
    if projection.phase == JobPhase::Succeeded {
        if let Some(target_image) = newest.annotations().get("target-image") {
            let created_at = projection
                .completion_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
            crate::images::record_success(&namespace, target_image, id, created_at).await?;
            info!(
                "Commit job {} for pod {} succeeded, recorded image {}",
                cyan(&newest.name_any()),
                cyan(id),
                cyan(target_image)
            );
        }
    }
    Ok(CommitStatus {
        has_job: true,
        job_name: Some(newest.name_any()),
        status: Some(projection.phase),
        message: Some(projection.message),
        start_time: projection.start_time.map(|t| t.to_rfc3339()),
        end_time: projection.completion_time.map(|t| t.to_rfc3339()),
    })
}

#[derive(Serialize, Kind)]
pub struct CommitLogs {
    pub logs: String,
}

/// Fetches logs from the newest commit job's pod, selected by label
/// `job-name={jobName}`, per §4.6.
pub async fn logs(identifier: &str, id: &str) -> Result<CommitLogs> {
    let namespace = names::namespace_of(identifier);
    let jobs = k8s::job::list_for_pod(&namespace, id).await?;
    let newest = jobs.first().ok_or_else(|| NotFound::new("commit job", id))?;
    let job_name = newest.name_any();

    let client: Api<Pod> = k8s::client::namespaced(&namespace).await;
    let pods = client
        .list(&ListParams::default().labels(&format!("job-name={}", job_name)))
        .await
        .map_err(k8s::errors::ApiError::from)?
        .items;
    let pod = pods.first().ok_or_else(|| NotFound::new("commit job pod", &job_name))?;
    let logs = client
        .logs(&pod.name_any(), &kube::api::LogParams::default())
        .await
        .map_err(k8s::errors::ApiError::from)?;
    Ok(CommitLogs { logs })
}
