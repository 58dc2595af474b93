use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::task::JoinSet;
use tracing::info;

use social_service::config::{Config, DatabaseConfig, StoreBackend};
use social_service::repository::{PgStore, Stores};
use social_service::{handlers, jobs, logging, metrics, SocialCore};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

/// Ready once the database answers; the memory backend is always ready
async fn readiness(pg: web::Data<Option<PgStore>>) -> impl Responder {
    match pg.get_ref() {
        Some(store) => match store.health_check().await {
            Ok(()) => HttpResponse::Ok().body("READY"),
            Err(e) => {
                tracing::warn!(error = %e, "Readiness check failed");
                HttpResponse::ServiceUnavailable().body("NOT READY")
            }
        },
        None => HttpResponse::Ok().body("READY"),
    }
}

async fn connect_postgres(database: &DatabaseConfig) -> Result<PgStore> {
    // Prepared statement caching disabled for PgBouncer transaction mode
    let connect_options = PgConnectOptions::from_str(&database.url)
        .context("Failed to parse DATABASE_URL")?
        .statement_cache_capacity(0);

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(connect_options)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database pool created and migrations applied");

    Ok(PgStore::new(pool))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    info!("Starting social-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        http_port = config.app.http_port,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    let (stores, pg_store) = match (config.store.backend, &config.store.database) {
        (StoreBackend::Postgres, Some(database)) => {
            let store = connect_postgres(database).await?;
            (Stores::from_backend(Arc::new(store.clone())), Some(store))
        }
        (StoreBackend::Postgres, None) => {
            anyhow::bail!("postgres backend selected without DATABASE_URL")
        }
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            (Stores::in_memory(), None)
        }
    };

    let core = web::Data::new(SocialCore::new(stores.clone(), config.feed.clone()));
    let readiness_data = web::Data::new(pg_store);

    let mut join_set = JoinSet::new();

    if config.jobs.story_sweep_enabled {
        let interval = Duration::from_secs(config.jobs.story_sweep_interval_secs);
        let content = stores.content.clone();
        join_set.spawn(async move {
            jobs::story_sweeper::run(content, interval).await;
            Ok(())
        });
        info!("Story sweeper started");
    } else {
        info!("Story sweeper disabled");
    }

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(core.clone())
            .app_data(readiness_data.clone())
            .wrap(tracing_actix_web::TracingLogger::default())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/ready", web::get().to(readiness))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::configure)
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .disable_signals()
    .run();

    let server_handle = http_server.handle();
    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });
    info!(addr = %http_addr, "HTTP server started");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            server_handle.stop(true).await;
        }
        Some(result) = join_set.join_next() => {
            match result {
                Ok(Ok(())) => info!("Task completed"),
                Ok(Err(e)) => {
                    tracing::error!("Task failed: {:#}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Task panicked: {:#}", e);
                    return Err(anyhow::anyhow!("Task panicked: {}", e));
                }
            }
        }
    }

    join_set.abort_all();
    info!("social-service shutting down");
    Ok(())
}
