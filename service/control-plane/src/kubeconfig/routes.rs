use crate::auth::Authenticated;
use crate::config::Config;
use crate::kubeconfig;
use response::Response;
use result::Result;
use rocket::http::{ContentType, Header};
use rocket::response::Responder;
use rocket::{get, Request, State};

type DownloadResult = Result<KubeconfigDownload>;

#[get("/kubeconfig")]
pub async fn get(auth: Authenticated, config: &State<Config>) -> Result<Response<kubeconfig::KubeconfigResult>> {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    Ok(kubeconfig::issue(&identifier, config).await?.into())
}

pub struct KubeconfigDownload(pub String);

impl<'r> Responder<'r, 'static> for KubeconfigDownload {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'static> {
        let mut response = rocket::Response::build();
        response.header(ContentType::Plain);
        response.header(Header::new(
            "Content-Disposition",
            "attachment; filename=config",
        ));
        response.sized_body(self.0.len(), std::io::Cursor::new(self.0));
        Ok(response.finalize())
    }
}

#[get("/kubeconfig/download")]
pub async fn download(auth: Authenticated, config: &State<Config>) -> DownloadResult {
    let identifier = names::identifier(&auth.0.username, &auth.0.email);
    let result = kubeconfig::issue(&identifier, config).await?;
    Ok(KubeconfigDownload(result.kubeconfig))
}
