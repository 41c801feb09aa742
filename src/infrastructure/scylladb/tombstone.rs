use anyhow::Context;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::read_model::Tombstone;

/// Names of a live read table and the tombstone table that shadows it.
pub(crate) struct TombstoneTables {
    pub live: &'static str,
    pub tombstones: &'static str,
    pub key: &'static str,
}

pub(crate) const ACCOUNT: TombstoneTables = TombstoneTables {
    live: "account_read",
    tombstones: "account_tombstone",
    key: "account_id",
};

pub(crate) const CUSTOMER: TombstoneTables = TombstoneTables {
    live: "customer_read",
    tombstones: "customer_tombstone",
    key: "customer_id",
};

impl TombstoneTables {
    pub(crate) async fn find(&self, session: &Session, id: Uuid) -> Result<Option<Tombstone>, RepositoryError> {
        let result = session
            .query_unpaged(
                format!(
                    "SELECT {key}, deleted_sequence, deleted_at FROM {table} WHERE {key} = ?",
                    key = self.key,
                    table = self.tombstones
                ),
                (id,),
            )
            .await
            .with_context(|| format!("Failed to query {}", self.tombstones))?;

        let rows_result = result
            .into_rows_result()
            .with_context(|| format!("Failed to parse {} rows", self.tombstones))?;
        let row = rows_result
            .maybe_first_row::<(Uuid, i64, DateTime<Utc>)>()
            .with_context(|| format!("Failed to read {} row", self.tombstones))?;

        Ok(row.map(|(aggregate_id, sequence_number, deleted_at)| Tombstone {
            aggregate_id,
            sequence_number,
            deleted_at,
        }))
    }

    pub(crate) async fn is_tombstoned(&self, session: &Session, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.find(session, id).await?.is_some())
    }

    /// Writes the tombstone, then removes the live row. Only the key column
    /// is read back, so a row that no longer parses can still be removed.
    pub(crate) async fn write(&self, session: &Session, tombstone: &Tombstone) -> Result<bool, RepositoryError> {
        let existing = session
            .query_unpaged(
                format!("SELECT {key} FROM {table} WHERE {key} = ?", key = self.key, table = self.live),
                (tombstone.aggregate_id,),
            )
            .await
            .with_context(|| format!("Failed to query {}", self.live))?
            .into_rows_result()
            .with_context(|| format!("Failed to parse {} rows", self.live))?
            .maybe_first_row::<(Uuid,)>()
            .with_context(|| format!("Failed to read {} key", self.live))?;

        session
            .query_unpaged(
                format!(
                    "INSERT INTO {table} ({key}, deleted_sequence, deleted_at) VALUES (?, ?, ?)",
                    key = self.key,
                    table = self.tombstones
                ),
                (tombstone.aggregate_id, tombstone.sequence_number, tombstone.deleted_at),
            )
            .await
            .with_context(|| format!("Failed to write {} row", self.tombstones))?;

        if existing.is_some() {
            session
                .query_unpaged(
                    format!("DELETE FROM {table} WHERE {key} = ?", key = self.key, table = self.live),
                    (tombstone.aggregate_id,),
                )
                .await
                .with_context(|| format!("Failed to delete {} row", self.live))?;
        }

        Ok(existing.is_some())
    }
}
