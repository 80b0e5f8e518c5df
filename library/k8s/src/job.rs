use crate::errors::ApiError;
use chrono::{DateTime, Utc};
use error::*;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, ListParams, PostParams};
use result::Result;
use serde::Serialize;
use serde_json;

#[derive(Error, GenetError, Kind, HttpCode, Debug)]
#[error("Failed to serialize the commit job for pod '{pod}'")]
#[code(Status::InternalServerError)]
pub struct JobSerializationError {
    pod: String,
    #[source]
    source: serde_json::Error,
}

/// Inputs required to assemble a `CommitJob` per §3/§4.6: a single
/// privileged container pinned to the source pod's node, mounting the
/// containerd socket (and, when registry credentials are configured, the
/// docker config secret), running a shell script that locates the
/// workspace container inside the `k8s.io` containerd namespace, commits
/// it, and pushes the result.
pub struct CommitJobInput<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub node_name: &'a str,
    pub source_pod: &'a str,
    pub user_identifier: &'a str,
    pub target_image: &'a str,
    pub commit_image: &'a str,
    pub registry_auth_secret: Option<&'a str>,
    pub insecure_registry: bool,
}

/// Builds the shell script the job container runs: list containers in the
/// `k8s.io` containerd namespace, find the one belonging to `source_pod`
/// (excluding the sandbox/pause container), commit it, then push.
fn commit_script(input: &CommitJobInput) -> String {
    let insecure = if input.insecure_registry { "--insecure-registry " } else { "" };
    format!(
        r#"set -euo pipefail
CONTAINER=$(nerdctl --namespace k8s.io ps --format '{{{{.Names}}}}' | grep "^k8s://.*/{source_pod}/" | grep -v "pause" | head -n1)
if [ -z "$CONTAINER" ]; then
    echo "no workspace container found for pod {source_pod}" >&2
    exit 1
fi
nerdctl --namespace k8s.io commit "$CONTAINER" {target_image}
nerdctl --namespace k8s.io push {insecure}{target_image}
"#,
        source_pod = input.source_pod,
        target_image = input.target_image,
        insecure = insecure,
    )
}

pub async fn create(input: &CommitJobInput<'_>) -> Result<Job> {
    let mut volumes = vec![serde_json::json!({
        "name": "containerd-sock",
        "hostPath": {"path": "/run/containerd/containerd.sock", "type": "Socket"}
    })];
    let mut volume_mounts = vec![serde_json::json!({
        "name": "containerd-sock",
        "mountPath": "/run/containerd/containerd.sock"
    })];
    if let Some(secret) = input.registry_auth_secret {
        volumes.push(serde_json::json!({
            "name": "docker-config",
            "secret": {"secretName": secret, "items": [{"key": ".dockerconfigjson", "path": "config.json"}]}
        }));
        volume_mounts.push(serde_json::json!({
            "name": "docker-config",
            "mountPath": "/root/.docker"
        }));
    }

    let job_json = serde_json::json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": input.name,
            "namespace": input.namespace,
            "labels": {
                "genet.io/managed": "true",
                "genet.io/type": "commit",
                "genet.io/pod": input.source_pod,
                "genet.io/user": input.user_identifier,
            },
            "annotations": {
                "target-image": input.target_image,
                "source-pod": input.source_pod,
            },
        },
        "spec": {
            "backoffLimit": 0,
            "ttlSecondsAfterFinished": 600,
            "template": {
                "metadata": {
                    "labels": {"job-name": input.name, "genet.io/managed": "true"},
                },
                "spec": {
                    "restartPolicy": "Never",
                    "nodeName": input.node_name,
                    "containers": [{
                        "name": "commit",
                        "image": input.commit_image,
                        "command": ["sh", "-c", commit_script(input)],
                        "securityContext": {"privileged": true},
                        "volumeMounts": volume_mounts,
                    }],
                    "volumes": volumes,
                }
            }
        }
    });

    let job: Job = serde_json::from_value(job_json).map_err(|source| JobSerializationError {
        pod: input.source_pod.to_string(),
        source,
    })?;
    let client: Api<Job> = crate::client::namespaced(input.namespace).await;
    client
        .create(&PostParams::default(), &job)
        .await
        .map_err(|err| ApiError::from(err).into())
}

/// `{Pending, Running, Succeeded, Failed}` per §4.6's status projection.
#[derive(Serialize, Debug, Eq, PartialEq, Clone, Kind)]
pub enum JobPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Serialize, Debug, Clone, Kind)]
pub struct JobStatusProjection {
    pub phase: JobPhase,
    pub message: String,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
}

pub fn project_status(job: &Job) -> JobStatusProjection {
    let status = job.status.clone().unwrap_or_default();
    let start_time = status.start_time.as_ref().map(|t| t.0);
    let completion_time = status.completion_time.as_ref().map(|t| t.0);
    let failed = status.failed.unwrap_or(0) > 0;
    let succeeded = status.succeeded.unwrap_or(0) > 0;
    let active = status.active.unwrap_or(0) > 0;

    let (phase, message) = if succeeded {
        (JobPhase::Succeeded, "commit completed successfully".to_string())
    } else if failed {
        let message = status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.type_ == "Failed")
            .and_then(|c| c.message)
            .unwrap_or_else(|| "commit job failed".to_string());
        (JobPhase::Failed, message)
    } else if active {
        (JobPhase::Running, "commit is running".to_string())
    } else {
        (JobPhase::Pending, "commit is pending scheduling".to_string())
    };

    JobStatusProjection {
        phase,
        message,
        start_time,
        completion_time,
    }
}

/// Returns `true` iff `phase` is non-terminal (`Pending` or `Running`); used
/// by the at-most-one-active-commit invariant and to block deletion of a
/// pod while its newest commit job is still in flight.
pub fn is_active(phase: &JobPhase) -> bool {
    matches!(phase, JobPhase::Pending | JobPhase::Running)
}

/// Lists all commit jobs for a given pod, newest-by-creation-timestamp first,
/// per §4.6's "selection for status/logs is newest by creation timestamp".
pub async fn list_for_pod<NS: AsRef<str>, P: AsRef<str>>(namespace: NS, pod: P) -> Result<Vec<Job>> {
    let client: Api<Job> = crate::client::namespaced(namespace).await;
    let mut jobs = client
        .list(&ListParams::default().labels(&format!(
            "genet.io/type=commit,genet.io/pod={}",
            pod.as_ref()
        )))
        .await
        .map_err(ApiError::from)?
        .items;
    jobs.sort_by_key(|j| {
        j.metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
    });
    jobs.reverse();
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_finds_workspace_container_and_pushes() {
        let input = CommitJobInput {
            name: "commit-zhang-san-zs-1700000000",
            namespace: "user-zhang-san-zs",
            node_name: "node-a",
            source_pod: "pod-zhang-san-zs-dev",
            user_identifier: "zhang-san-zs",
            target_image: "registry.example.com/zhang/snapshot:v1",
            commit_image: "docker.io/library/nerdctl:latest",
            registry_auth_secret: None,
            insecure_registry: false,
        };
        let script = commit_script(&input);
        assert!(script.contains("pod-zhang-san-zs-dev"));
        assert!(script.contains("nerdctl --namespace k8s.io commit"));
        assert!(script.contains("registry.example.com/zhang/snapshot:v1"));
        assert!(!script.contains("--insecure-registry"));
    }

    #[test]
    fn active_phases() {
        assert!(is_active(&JobPhase::Pending));
        assert!(is_active(&JobPhase::Running));
        assert!(!is_active(&JobPhase::Succeeded));
        assert!(!is_active(&JobPhase::Failed));
    }
}
