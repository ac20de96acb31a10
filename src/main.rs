use actix_web::{middleware::Compress, App, HttpServer};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

use tapdeck::adapters::{GenTextBio, YouTubeLookup};
use tapdeck::domain::DohResolver;
use tapdeck::media::build_media_store;
use tapdeck::openapi::ApiDoc;
use tapdeck::webhook::build_mailer;
use tapdeck::{config, AppState, SecurityHeaders, SessionRegistry};

#[cfg(feature = "inmem-store")]
use tapdeck::repo::inmem::InMemRepo;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker, etc.)
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping Tapdeck server");
    info!("Channel lookup configured: {}", std::env::var("YOUTUBE_API_KEY").is_ok());
    info!("Bio generation configured: {}", std::env::var("GENAI_API_KEY").is_ok());
    info!(
        "Frontend URL: {}",
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string())
    );

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        tapdeck::repo::pg::PgRepo::new(pool)
    };

    let openapi = ApiDoc::openapi();
    let media = build_media_store()
        .await
        .map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, format!("media store init failed: {e}"))
        })?;
    let repo: Arc<dyn tapdeck::repo::Repo> = Arc::new(repo);
    let state = AppState {
        sessions: Arc::new(SessionRegistry::new(repo.clone())),
        repo,
        media,
        channel_lookup: Arc::new(YouTubeLookup::from_env()),
        bio: Arc::new(GenTextBio::from_env()),
        resolver: Arc::new(DohResolver::from_env()),
        mailer: build_mailer(),
        webhook_secret: std::env::var("WEBHOOK_SECRET").ok(),
        ip_salt: std::env::var("IP_HASH_SALT").unwrap_or_else(|_| "tapdeck".to_string()),
    };
    if state.webhook_secret.is_none() {
        info!("WEBHOOK_SECRET not set; signup webhook signature check disabled");
    }
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local dev frontend ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
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
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(state.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080 (all interfaces)");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let required = vec!["JWT_SECRET"];

    let mut missing = Vec::new();
    for var in required {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {:?}", missing);
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }

    if env::var("YOUTUBE_API_KEY").is_err() {
        eprintln!("Warning: YOUTUBE_API_KEY not set; creator card generation will be unavailable");
    }
}
