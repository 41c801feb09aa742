use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::account::{Account, AccountCommandRepository, AccountStatus};
use crate::domain::common::{AccountNumber, CurrencyCode, Money};
use crate::errors::RepositoryError;
use crate::outbox::OutboxMessage;
use super::outbox_store::insert_outbox;

pub struct PgAccountCommandRepository {
    pool: PgPool,
}

impl PgAccountCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: &PgRow) -> Result<Account, RepositoryError> {
        let number: String = row.try_get("account_number")?;
        let balance: Decimal = row.try_get("balance")?;
        let currency: String = row.try_get("currency")?;
        let status: String = row.try_get("status")?;

        Ok(Account::reconstruct(
            row.try_get("id")?,
            AccountNumber::parse(number).context("Corrupt account number in accounts row")?,
            row.try_get("customer_id")?,
            Money::of(balance, CurrencyCode::new(currency).context("Corrupt currency in accounts row")?),
            status
                .parse::<AccountStatus>()
                .context("Corrupt status in accounts row")?,
            row.try_get("version")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }
}

#[async_trait]
impl AccountCommandRepository for PgAccountCommandRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_number, customer_id, balance, currency, status,
                   version, created_at, updated_at
            FROM accounts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn insert(&self, account: &Account, outbox: &OutboxMessage) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, account_number, customer_id, balance, currency, status,
                version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id())
        .bind(account.account_number().as_str())
        .bind(account.customer_id())
        .bind(account.balance().amount())
        .bind(account.balance().currency().as_str())
        .bind(account.status().as_str())
        .bind(account.version())
        .bind(account.created_at())
        .bind(account.updated_at())
        .execute(&mut *tx)
        .await?;

        insert_outbox(&mut *tx, outbox).await?;
        tx.commit().await?;

        tracing::debug!(account_id = %account.id(), "Account row and outbox event written");
        Ok(())
    }

    async fn update(
        &self,
        account: &Account,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $3, currency = $4, status = $5, version = $6, updated_at = $7
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(account.id())
        .bind(expected_version)
        .bind(account.balance().amount())
        .bind(account.balance().currency().as_str())
        .bind(account.status().as_str())
        .bind(account.version())
        .bind(account.updated_at())
        .execute(&mut *tx)
        .await?;

        // dropping the transaction rolls it back
        if result.rows_affected() == 0 {
            return Err(RepositoryError::ConcurrencyConflict {
                aggregate_id: account.id(),
                expected_version,
            });
        }

        insert_outbox(&mut *tx, outbox).await?;
        tx.commit().await?;
        Ok(())
    }
}
