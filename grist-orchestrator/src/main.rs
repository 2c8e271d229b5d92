//! Grist Orchestrator
//!
//! REST service and in-process worker for the Grist dataset process engine.
//!
//! Architecture:
//! - API: axum handlers for repositories, records and processes
//! - Store: sqlx persistence per entity
//! - Service: business logic (submission, iteration, validation, deletion)
//! - Worker: pending-process poller, pipeline execution with telemetry,
//!   and the optional system-run scheduler

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod service;
pub mod store;
pub mod worker;

use crate::config::Config;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grist_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Grist Orchestrator...");

    let config = Arc::new(Config::from_env());
    config.validate().expect("Invalid configuration");

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // Start the worker loops
    let poller = worker::ProcessPoller::new(pool.clone(), Arc::clone(&config));
    tokio::spawn(async move { poller.run().await });

    if config.system_runs_enabled {
        let scheduler = worker::SystemRunScheduler::new(pool.clone(), Arc::clone(&config));
        tokio::spawn(async move { scheduler.run().await });
        tracing::info!("System-run scheduler enabled");
    }

    // Build router with all API endpoints
    let app = api::create_router(pool, Arc::clone(&config));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
