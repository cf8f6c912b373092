use actix_web::web;
use super::handlers::{modal, profile, transaction, verification};

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(profile::health))
            .service(
                web::scope("/security")
                    // Interaction windows
                    .route("/modal/start", web::post().to(modal::start_modal))
                    .route("/modal/interaction", web::post().to(modal::record_interaction))
                    .route("/modal/end", web::post().to(modal::end_modal))
                    .route("/modal/status/{session_id}/{modal_type}", web::get().to(modal::modal_status))
                    // Pre-sign gate
                    .route("/pre-sign", web::post().to(transaction::pre_sign))
                    .route(
                        "/confirm-after-verification",
                        web::post().to(transaction::confirm_after_verification),
                    )
                    // Email verification
                    .route("/email/register", web::post().to(verification::register_email))
                    .route("/email/verify", web::post().to(verification::verify_code))
                    .route("/email/token-status/{token_id}", web::get().to(verification::token_status))
                    .route("/wallet/bind", web::post().to(verification::bind_wallet))
                    .route("/session/end", web::post().to(profile::end_session))
                    // Read-only views
                    .route("/profile/{session_id}", web::get().to(profile::get_profile))
                    .route("/config", web::get().to(profile::get_config)),
            ),
    );
}
