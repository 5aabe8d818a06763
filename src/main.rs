use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use gallery::openapi::ApiDoc;
use gallery::repo::Repo;
use gallery::routes::users::ensure_bootstrap_user;
use gallery::storage::build_object_store;
use gallery::{configure, AppConfig, AppState, SecurityHeaders};

async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    #[cfg(feature = "postgres-store")]
    if let Some(url) = &cfg.database_url {
        use sqlx::postgres::PgPoolOptions;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("connecting to Postgres")?;
        let repo = gallery::repo::pg::PgRepo::new(pool);
        repo.migrate().await.context("running migrations")?;
        info!("Using Postgres repository backend");
        return Ok(Arc::new(repo));
    }

    #[cfg(feature = "inmem-store")]
    {
        use gallery::repo::inmem::InMemRepo;
        let repo = match &cfg.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
                info!("Using in-memory repository persisted under '{}'", dir.display());
                InMemRepo::open(dir)
            }
            None => {
                info!("Using ephemeral in-memory repository backend");
                InMemRepo::new()
            }
        };
        return Ok(Arc::new(repo));
    }

    #[allow(unreachable_code)]
    Err(anyhow::anyhow!("no repository backend available; set DATABASE_URL or enable inmem-store"))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env is only read in debug builds
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env().context("invalid configuration")?;
    info!("Bootstrapping gallery server");
    info!("Upload extensions: {}", cfg.upload_extensions.join(", "));

    let repo = build_repo(&cfg).await?;
    let store = build_object_store(&cfg.storage).await?;
    if let Some((name, password)) = &cfg.bootstrap_user {
        ensure_bootstrap_user(repo.as_ref(), name, password).await?;
    }

    let headers = SecurityHeaders::from_config(&cfg);
    let bind_addr = cfg.bind_addr.clone();
    let state = AppState { repo, store, config: Arc::new(cfg) };
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(headers.clone())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&bind_addr)?;

    info!("Listening on http://{bind_addr}");
    server.run().await?;
    Ok(())
}
