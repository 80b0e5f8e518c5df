use error::*;
use k8s::configmap::{get_key, put_key, USER_IMAGES_CONFIGMAP, USER_IMAGES_KEY};
use result::Result;
use serde::{Deserialize, Serialize};

/// One entry of the `genet-user-images` ConfigMap, tracking the most recent
/// commit outcome for a given image name. Uniqueness is by `image`.
#[derive(Serialize, Deserialize, Kind, Clone, Debug)]
pub struct UserImageRecord {
    pub image: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "sourcePod")]
    pub source_pod: String,
    #[serde(rename = "savedAt")]
    pub saved_at: String,
}

#[derive(Error, GenetError, Kind, HttpCode, Debug)]
#[error("failed to read user image records: {reason}")]
#[code(Status::InternalServerError)]
pub struct RecordCorrupt {
    reason: String,
}

async fn load(namespace: &str) -> Result<Vec<UserImageRecord>> {
    match get_key(namespace, USER_IMAGES_CONFIGMAP, USER_IMAGES_KEY).await? {
        Some(raw) => serde_json::from_str(&raw).map_err(|err| {
            RecordCorrupt {
                reason: err.to_string(),
            }
            .into()
        }),
        None => Ok(vec![]),
    }
}

async fn save(namespace: &str, records: &[UserImageRecord]) -> Result<()> {
    let raw = serde_json::to_string(records).map_err(|err| RecordCorrupt {
        reason: err.to_string(),
    })?;
    put_key(namespace, USER_IMAGES_CONFIGMAP, USER_IMAGES_KEY, raw).await
}

/// Appends or replaces (by `image`) a record, per §4.6's outcome capture on
/// a successful commit.
pub async fn record_success(namespace: &str, image: &str, source_pod: &str, saved_at: String) -> Result<()> {
    let mut records = load(namespace).await?;
    records.retain(|r| r.image != image);
    records.push(UserImageRecord {
        image: image.to_string(),
        description: None,
        source_pod: source_pod.to_string(),
        saved_at,
    });
    save(namespace, &records).await
}
