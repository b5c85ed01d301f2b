use std::io;

use actix_web::{middleware::Logger, web, App, HttpServer};
use filedrop::{config::Config, configure_app, cors, services::storage::FileStorage};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config =
        Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let storage =
        FileStorage::new(&config.upload_dir, config.on_collision).map_err(io::Error::other)?;

    let host = config.service_host.clone();
    let port = config.service_port;
    let workers = config.workers;

    let config = web::Data::new(config);
    let routes = configure_app(config.clone(), web::Data::new(storage));

    info!("Server started at http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors(&config))
            .configure(routes.clone())
    })
    .bind((host.as_str(), port))?
    .workers(workers)
    .run()
    .await
}
