pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use actix_cors::Cors;
use actix_multipart::form::MultipartFormConfig;
use actix_web::web;

use config::Config;
use services::storage::FileStorage;

/// Registers shared state and the file routes. Cloned into every worker.
pub fn configure_app(
    config: web::Data<Config>,
    storage: web::Data<FileStorage>,
) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(MultipartFormConfig::default().total_limit(config.max_upload_size))
            .app_data(config.clone())
            .app_data(storage.clone())
            .configure(handlers::files::configure);
    }
}

pub fn cors(config: &Config) -> Cors {
    if config.is_development {
        return Cors::permissive();
    }

    config.cors_domains.iter().fold(
        Cors::default()
            .allowed_methods(vec!["GET", "HEAD", "POST"])
            .allow_any_header()
            .max_age(3600),
        |cors, origin| cors.allowed_origin(origin),
    )
}
