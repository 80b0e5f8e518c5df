mod auth;
mod cluster;
mod commit;
mod config;
mod env;
mod errors;
mod gpu;
mod images;
mod kubeconfig;
mod oidc;
mod pods;

use config::Config;
use oidc::keys::SigningKeypair;

#[macro_use]
extern crate rocket;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

fn init_logging() {
    use std::io::Write;

    std::env::set_var("RUST_LOG_STYLE", "always");
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", env::log_level());
    }

    let mut builder = env_logger::Builder::from_default_env();
    if env::log_format() == "json" {
        builder.format(|buf, record| {
            writeln!(
                buf,
                r#"{{"level":"{}","target":"{}","message":"{}"}}"#,
                record.level(),
                record.target(),
                record.args()
            )
        });
    }
    builder.init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let config = Config::load();
    let keypair = SigningKeypair::load_or_generate(&config);

    tokio::spawn(oidc::run_sweeper());

    let mut rocket_config = rocket::Config::default();
    // 0.0.0.0 so the process is reachable when running in a container;
    // 127.0.0.1 (rocket's default) is not.
    rocket_config.address = "0.0.0.0".parse().unwrap();
    rocket_config.port = env::port();

    rocket::custom(rocket_config)
        .manage(config)
        .manage(keypair)
        .mount(
            "/api",
            routes![
                auth::oauth::status,
                auth::oauth::login,
                auth::oauth::callback,
                auth::oauth::logout,
                pods::routes::list,
                pods::routes::create,
                pods::routes::get,
                pods::routes::delete,
                pods::routes::extend,
                pods::routes::logs,
                pods::routes::events,
                pods::routes::describe,
                gpu::routes::gpu_overview,
                commit::routes::start,
                commit::routes::status,
                commit::routes::logs,
                kubeconfig::routes::get,
                kubeconfig::routes::download,
                cluster::info,
            ],
        )
        .mount(
            "/",
            routes![
                oidc::discovery::discovery,
                oidc::jwks::jwks,
                oidc::authorize::authorize,
                oidc::callback::callback,
                oidc::token::token,
                oidc::userinfo::userinfo,
            ],
        )
        .launch()
        .await
        .unwrap();
}
