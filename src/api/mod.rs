pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use log::{debug, info};
use middleware::logging::RequestLogger;

use crate::config::Config;
use crate::security::{SecurityError, TransactionSecurityService};
use crate::utils::sanitize_for_log;
use crate::wallet::WalletClient;

/// Shared state handed to every handler
pub struct AppState {
    pub service: Arc<TransactionSecurityService>,
    pub wallet: Arc<dyn WalletClient>,
    pub config: Config,
}

impl AppState {
    pub fn new(service: Arc<TransactionSecurityService>, wallet: Arc<dyn WalletClient>, config: Config) -> Self {
        AppState { service, wallet, config }
    }
}

/// JSON extractor that answers malformed bodies with the engine's validation error shape
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, req| {
            let message = sanitize_for_log(&err.to_string());
            debug!("Rejected body for {}: {}", req.path(), message);
            SecurityError::Validation(message).into()
        })
}

pub async fn start_api_server(config: Config, state: web::Data<AppState>) -> std::io::Result<()> {
    let server_address = format!("{}:{}", config.api.host, config.api.port);

    info!("Starting API server on {}", server_address);

    let cors_origin = config.api.cors_origin.clone();
    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = match &cors_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        }
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec!["Content-Type"])
        .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(RequestLogger::new())
            .app_data(state.clone())
            .app_data(json_config())
            // Register API routes
            .configure(routes::register_routes)
    })
    .bind(server_address)?;

    let server = match config.api.workers {
        Some(workers) => server.workers(workers),
        None => server,
    };

    server.run().await
}
