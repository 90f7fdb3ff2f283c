use actix_web::{middleware::Compress, web, App, HttpResponse, HttpServer};
use actix_cors::Cors;

mod error;
mod models;
mod openapi;
mod repo;
mod routes;
mod tree;
mod vote;

use openapi::ApiDoc;
use repo::build_repo;
use routes::{config, AppState};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds; deployments set real
    // environment variables (systemd, Docker, etc.).
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping HubCorner server");

    let repo = build_repo()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .configure(config)
            .route("/docs/openapi.json", web::get().to(openapi_json))
            .app_data(web::Data::new(AppState { repo: repo.clone() }))
    })
    .bind(&bind_addr)?;

    info!("Listening on http://{bind_addr}");

    server.run().await
}
