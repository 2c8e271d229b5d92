use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create repositories table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            url TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            parameters JSONB NOT NULL DEFAULT '[]',
            current_data_size BIGINT NOT NULL DEFAULT 0,
            original_data_size BIGINT NOT NULL DEFAULT 0,
            data_ready BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create records table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id UUID PRIMARY KEY,
            repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
            data JSONB NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create processes table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processes (
            id UUID PRIMARY KEY,
            repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
            repository_version INTEGER NOT NULL,
            process_id UUID NOT NULL,
            iteration INTEGER NOT NULL,
            task_process VARCHAR(20) NOT NULL,
            actions TEXT[] NOT NULL DEFAULT '{}',
            trigger_type VARCHAR(20) NOT NULL,
            optimized BOOLEAN NOT NULL,
            status VARCHAR(20) NOT NULL,
            parameters JSONB NOT NULL DEFAULT '[]',
            start_time TIMESTAMPTZ,
            end_time TIMESTAMPTZ,
            duration_ms BIGINT,
            input_data_size BIGINT,
            output_data_size BIGINT,
            errors TEXT,
            validated BOOLEAN NOT NULL DEFAULT FALSE,
            valid BOOLEAN NOT NULL DEFAULT FALSE,
            metrics JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create process results table (stored stage outputs for validation)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS process_results (
            id UUID PRIMARY KEY,
            process_item_id UUID NOT NULL REFERENCES processes(id) ON DELETE CASCADE,
            process_id UUID NOT NULL,
            task_process VARCHAR(20) NOT NULL,
            optimized BOOLEAN NOT NULL,
            iteration INTEGER NOT NULL,
            trigger_type VARCHAR(20) NOT NULL,
            output JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The iteration compare-and-swap: concurrent iterate calls on one
    // process_id cannot both insert the same iteration number.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_processes_iteration_unique
        ON processes(process_id, iteration, task_process, optimized, trigger_type)
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_processes_status ON processes(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_processes_repository_id ON processes(repository_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_processes_process_id ON processes(process_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_repository_id ON records(repository_id, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_process_results_item ON process_results(process_item_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
