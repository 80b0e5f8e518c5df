use crate::auth::Authenticated;
use crate::config::Config;
use crate::pods::{admission, inspection};
use kind::Kind;
use response::Response;
use result::Result;
use rocket::serde::json::Json;
use rocket::{delete, get, post, State};
use serde::Serialize;

#[derive(Serialize, Kind)]
pub struct QuotaView {
    #[serde(rename = "podLimit")]
    pub pod_limit: u32,
    #[serde(rename = "gpuLimit")]
    pub gpu_limit: u32,
}

#[derive(Serialize, Kind)]
pub struct PodsView {
    pub pods: Vec<inspection::PodSummary>,
    pub quota: QuotaView,
}

#[get("/pods")]
pub async fn list(auth: Authenticated, config: &State<Config>) -> Result<Response<PodsView>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    let pods = inspection::list(&identifier).await?;
    Ok(PodsView {
        pods,
        quota: QuotaView {
            pod_limit: config.pod_limit_per_user,
            gpu_limit: config.gpu_limit_per_user,
        },
    }
    .into())
}

#[derive(Serialize, Kind)]
pub struct CreatedPod {
    pub id: String,
    pub name: String,
}

#[post("/pods", data = "<body>")]
pub async fn create(
    auth: Authenticated,
    body: Json<admission::CreatePodRequest>,
    config: &State<Config>,
) -> Result<Response<CreatedPod>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    let pod = admission::admit(&body, config, &identifier).await?;
    let name = kube::ResourceExt::name_any(&pod);
    Ok(CreatedPod {
        id: name.clone(),
        name,
    }
    .into())
}

#[get("/pods/<id>")]
pub async fn get(auth: Authenticated, id: String) -> Result<Response<inspection::PodSummary>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(inspection::get(&identifier, &id).await?.into())
}

#[delete("/pods/<id>")]
pub async fn delete(
    auth: Authenticated,
    id: String,
    config: &State<Config>,
) -> Result<Response<()>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    inspection::delete(&identifier, &id, config).await?;
    Ok(().into())
}

#[post("/pods/<id>/extend")]
pub async fn extend(
    auth: Authenticated,
    id: String,
    config: &State<Config>,
) -> Result<Response<inspection::ExtendResult>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(inspection::extend(&identifier, &id, config).await?.into())
}

#[get("/pods/<id>/logs?<tail>")]
pub async fn logs(
    auth: Authenticated,
    id: String,
    tail: Option<i64>,
) -> Result<Response<inspection::LogsResult>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(inspection::logs(&identifier, &id, tail).await?.into())
}

#[get("/pods/<id>/events")]
pub async fn events(auth: Authenticated, id: String) -> Result<Response<inspection::EventsResult>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(inspection::events(&identifier, &id).await?.into())
}

#[get("/pods/<id>/describe")]
pub async fn describe(auth: Authenticated, id: String) -> Result<Response<inspection::DescribeResult>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(inspection::describe(&identifier, &id).await?.into())
}
