use anyhow::{Context, Result};
use scylla::client::session::Session;

// Read-side tables. Lookups by account number and by email go through
// secondary indexes; `email_key` is the lower-cased email so the lookup
// ignores case while `email` keeps the spelling the customer used.
// The `*_tombstone` tables remember deleted ids so late events for them
// are ignored.
const READ_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS account_read (
        account_id uuid PRIMARY KEY,
        account_number text,
        customer_id uuid,
        balance_amount bigint,
        currency_code text,
        status text,
        created_at timestamp,
        updated_at timestamp,
        last_sequence bigint,
        last_event_at timestamp,
        needs_backfill boolean
    )
    "#,
    "CREATE INDEX IF NOT EXISTS account_read_number_idx ON account_read (account_number)",
    r#"
    CREATE TABLE IF NOT EXISTS customer_read (
        customer_id uuid PRIMARY KEY,
        name text,
        email text,
        email_key text,
        address text,
        phone_number text,
        birth_date date,
        status text,
        last_sequence bigint,
        last_event_at timestamp,
        needs_backfill boolean
    )
    "#,
    "CREATE INDEX IF NOT EXISTS customer_read_email_idx ON customer_read (email_key)",
    r#"
    CREATE TABLE IF NOT EXISTS account_tombstone (
        account_id uuid PRIMARY KEY,
        deleted_sequence bigint,
        deleted_at timestamp
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS customer_tombstone (
        customer_id uuid PRIMARY KEY,
        deleted_sequence bigint,
        deleted_at timestamp
    )
    "#,
];

/// Create the keyspace if needed, switch the session to it and create the
/// read tables.
pub async fn ensure_read_schema(session: &Session, keyspace: &str) -> Result<()> {
    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
            ),
            &[],
        )
        .await
        .with_context(|| format!("Failed to create keyspace {keyspace}"))?;

    session
        .use_keyspace(keyspace, false)
        .await
        .with_context(|| format!("Failed to use keyspace {keyspace}"))?;

    for statement in READ_TABLES {
        session
            .query_unpaged(*statement, &[])
            .await
            .context("Failed to create read table")?;
    }

    tracing::info!(keyspace, "Read schema ready");
    Ok(())
}
