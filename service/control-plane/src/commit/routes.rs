use crate::auth::Authenticated;
use crate::commit::{self, CommitRequest};
use crate::config::Config;
use response::Response;
use result::Result;
use rocket::serde::json::Json;
use rocket::{get, post, State};

#[post("/pods/<id>/commit", data = "<body>")]
pub async fn start(
    auth: Authenticated,
    id: String,
    body: Json<CommitRequest>,
    config: &State<Config>,
) -> Result<Response<commit::CommitStarted>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(commit::start(&identifier, &id, &body, config).await?.into())
}

#[get("/pods/<id>/commit/status")]
pub async fn status(auth: Authenticated, id: String) -> Result<Response<commit::CommitStatus>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(commit::status(&identifier, &id).await?.into())
}

#[get("/pods/<id>/commit/logs")]
pub async fn logs(auth: Authenticated, id: String) -> Result<Response<commit::CommitLogs>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(commit::logs(&identifier, &id).await?.into())
}
