use anyhow::{Context, Result};
use sqlx::PgPool;

// ============================================================================
// PostgreSQL Schemas
// ============================================================================
//
// Command store: aggregates, the outbox they write into, and the dead
// letters. The auth store lives in its own database.
//
// ============================================================================

const COMMAND_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id UUID PRIMARY KEY,
        account_number VARCHAR(13) NOT NULL,
        customer_id UUID NOT NULL,
        balance NUMERIC(19, 2) NOT NULL,
        currency CHAR(3) NOT NULL,
        status VARCHAR(16) NOT NULL,
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT accounts_account_number_key UNIQUE (account_number)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_accounts_customer_id ON accounts(customer_id)",
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id UUID PRIMARY KEY,
        first_name TEXT NOT NULL,
        middle_name TEXT,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL,
        country TEXT NOT NULL,
        state TEXT NOT NULL,
        city TEXT NOT NULL,
        street TEXT NOT NULL,
        postal_code TEXT NOT NULL,
        phone_number VARCHAR(16) NOT NULL,
        password_hash TEXT NOT NULL,
        birth_date DATE NOT NULL,
        status VARCHAR(16) NOT NULL,
        version BIGINT NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS customers_email_key ON customers (LOWER(email))",
    r#"
    CREATE TABLE IF NOT EXISTS outbox_messages (
        seq BIGSERIAL PRIMARY KEY,
        id UUID NOT NULL UNIQUE,
        aggregate_id UUID NOT NULL,
        aggregate_type VARCHAR(32) NOT NULL,
        event_id UUID NOT NULL,
        event_type VARCHAR(64) NOT NULL,
        topic TEXT NOT NULL,
        partition_key TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        attempts INT NOT NULL DEFAULT 0,
        last_error TEXT,
        published_at TIMESTAMPTZ,
        dead_lettered_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox_messages(seq)
        WHERE published_at IS NULL AND dead_lettered_at IS NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_outbox_dead_lettered ON outbox_messages(aggregate_id)
        WHERE dead_lettered_at IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dead_letter_queue (
        id UUID PRIMARY KEY,
        source VARCHAR(16) NOT NULL,
        aggregate_id UUID,
        event_type VARCHAR(64) NOT NULL,
        payload TEXT NOT NULL,
        error_message TEXT NOT NULL,
        failure_count INT NOT NULL,
        first_failed_at TIMESTAMPTZ NOT NULL,
        last_failed_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

const AUTH_SCHEMA: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS auth_credentials (
        customer_id UUID PRIMARY KEY,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#];

async fn apply(pool: &PgPool, statements: &[&str], name: &str) -> Result<()> {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to apply {name} schema"))?;
    }
    tracing::info!(schema = name, statements = statements.len(), "Schema ready");
    Ok(())
}

pub async fn ensure_command_schema(pool: &PgPool) -> Result<()> {
    apply(pool, COMMAND_SCHEMA, "command").await
}

pub async fn ensure_auth_schema(pool: &PgPool) -> Result<()> {
    apply(pool, AUTH_SCHEMA, "auth").await
}
