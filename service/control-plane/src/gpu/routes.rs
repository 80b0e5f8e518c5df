use crate::auth::Authenticated;
use crate::config::Config;
use crate::gpu;
use response::Response;
use result::Result;
use rocket::{get, State};

#[get("/cluster/gpu-overview")]
pub async fn gpu_overview(
    _auth: Authenticated,
    config: &State<Config>,
) -> Result<Response<gpu::GpuOverview>> {
    Ok(gpu::overview(config).await?.into())
}
