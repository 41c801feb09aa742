use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::serialize::row::SerializeRow;
use uuid::Uuid;

use crate::domain::account::AccountStatus;
use crate::errors::RepositoryError;
use crate::read_model::{AccountReadEntity, AccountReadRepository, Tombstone};
use super::tombstone::ACCOUNT;

const SELECT_COLUMNS: &str = "SELECT account_id, account_number, customer_id, balance_amount, currency_code, \
     status, created_at, updated_at, last_sequence, last_event_at, needs_backfill FROM account_read";

type AccountRow = (
    Uuid,
    String,
    Uuid,
    i64,
    String,
    String,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    i64,
    DateTime<Utc>,
    bool,
);

pub struct ScyllaAccountReadRepository {
    session: Arc<Session>,
}

impl ScyllaAccountReadRepository {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn select_one(
        &self,
        query: String,
        key: impl SerializeRow,
    ) -> Result<Option<AccountReadEntity>, RepositoryError> {
        let result = self
            .session
            .query_unpaged(query, key)
            .await
            .context("Failed to query account_read")?;

        let rows_result = result.into_rows_result().context("Failed to parse account_read rows")?;
        let row = rows_result
            .maybe_first_row::<AccountRow>()
            .context("Failed to read account_read row")?;

        row.map(row_to_entity).transpose()
    }
}

fn row_to_entity(row: AccountRow) -> Result<AccountReadEntity, RepositoryError> {
    let (
        account_id,
        account_number,
        customer_id,
        balance_amount,
        currency_code,
        status,
        created_at,
        updated_at,
        last_sequence,
        last_event_at,
        needs_backfill,
    ) = row;

    let status = status
        .parse::<AccountStatus>()
        .map_err(|_| anyhow!("Unknown status '{status}' in account_read row {account_id}"))?;

    Ok(AccountReadEntity {
        account_id,
        account_number,
        customer_id,
        balance_amount,
        currency_code,
        status,
        created_at,
        updated_at,
        last_sequence,
        last_event_at,
        needs_backfill,
    })
}

#[async_trait]
impl AccountReadRepository for ScyllaAccountReadRepository {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<AccountReadEntity>, RepositoryError> {
        if ACCOUNT.is_tombstoned(&self.session, account_id).await? {
            return Ok(None);
        }
        self.select_one(format!("{SELECT_COLUMNS} WHERE account_id = ?"), (account_id,))
            .await
    }

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<AccountReadEntity>, RepositoryError> {
        let row = self
            .select_one(format!("{SELECT_COLUMNS} WHERE account_number = ?"), (account_number,))
            .await?;
        match row {
            Some(row) if ACCOUNT.is_tombstoned(&self.session, row.account_id).await? => Ok(None),
            row => Ok(row),
        }
    }

    async fn upsert(&self, entity: &AccountReadEntity) -> Result<(), RepositoryError> {
        self.session
            .query_unpaged(
                "INSERT INTO account_read (
                    account_id, account_number, customer_id, balance_amount, currency_code,
                    status, created_at, updated_at, last_sequence, last_event_at, needs_backfill
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    entity.account_id,
                    &entity.account_number,
                    entity.customer_id,
                    entity.balance_amount,
                    &entity.currency_code,
                    entity.status.as_str(),
                    entity.created_at,
                    entity.updated_at,
                    entity.last_sequence,
                    entity.last_event_at,
                    entity.needs_backfill,
                ),
            )
            .await
            .context("Failed to upsert account_read row")?;

        Ok(())
    }

    async fn find_tombstone(&self, account_id: Uuid) -> Result<Option<Tombstone>, RepositoryError> {
        ACCOUNT.find(&self.session, account_id).await
    }

    async fn tombstone(&self, tombstone: &Tombstone) -> Result<bool, RepositoryError> {
        ACCOUNT.write(&self.session, tombstone).await
    }
}
