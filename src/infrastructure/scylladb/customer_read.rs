use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use scylla::client::session::Session;
use uuid::Uuid;

use crate::domain::customer::{CustomerStatus, Email};
use crate::errors::RepositoryError;
use crate::read_model::{CustomerReadEntity, CustomerReadRepository, Tombstone};
use super::tombstone::CUSTOMER;

type CustomerRow = (
    Uuid,
    String,
    Option<String>,
    String,
    String,
    Option<NaiveDate>,
    String,
    i64,
    DateTime<Utc>,
    bool,
);

pub struct ScyllaCustomerReadRepository {
    session: Arc<Session>,
}

impl ScyllaCustomerReadRepository {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl CustomerReadRepository for ScyllaCustomerReadRepository {
    async fn find_by_id(&self, customer_id: Uuid) -> Result<Option<CustomerReadEntity>, RepositoryError> {
        if CUSTOMER.is_tombstoned(&self.session, customer_id).await? {
            return Ok(None);
        }

        let result = self
            .session
            .query_unpaged(
                "SELECT customer_id, name, email, address, phone_number, birth_date, status,
                        last_sequence, last_event_at, needs_backfill
                 FROM customer_read WHERE customer_id = ?",
                (customer_id,),
            )
            .await
            .context("Failed to query customer_read")?;

        let rows_result = result.into_rows_result().context("Failed to parse customer_read rows")?;
        let Some(row) = rows_result
            .maybe_first_row::<CustomerRow>()
            .context("Failed to read customer_read row")?
        else {
            return Ok(None);
        };

        let (
            customer_id,
            name,
            email,
            address,
            phone_number,
            birth_date,
            status,
            last_sequence,
            last_event_at,
            needs_backfill,
        ) = row;
        let status = status
            .parse::<CustomerStatus>()
            .map_err(|_| anyhow!("Unknown status '{status}' in customer_read row {customer_id}"))?;

        Ok(Some(CustomerReadEntity {
            customer_id,
            name,
            email,
            address,
            phone_number,
            birth_date,
            status,
            last_sequence,
            last_event_at,
            needs_backfill,
        }))
    }

    async fn exists_by_email(&self, email: &Email) -> Result<bool, RepositoryError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT customer_id FROM customer_read WHERE email_key = ?",
                (email.normalized(),),
            )
            .await
            .context("Failed to query customer_read by email")?;

        let rows_result = result.into_rows_result().context("Failed to parse customer_read rows")?;
        // a tombstoned customer may still hold the address until its row is gone
        let customer_ids = rows_result
            .rows::<(Uuid,)>()
            .context("Failed to read customer_read rows")?
            .map(|row| row.map(|(customer_id,)| customer_id))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read customer_read row")?;

        for customer_id in customer_ids {
            if !CUSTOMER.is_tombstoned(&self.session, customer_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn upsert(&self, entity: &CustomerReadEntity) -> Result<(), RepositoryError> {
        let email_key = entity.email.as_deref().map(str::to_lowercase);

        self.session
            .query_unpaged(
                "INSERT INTO customer_read (
                    customer_id, name, email, email_key, address, phone_number,
                    birth_date, status, last_sequence, last_event_at, needs_backfill
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    entity.customer_id,
                    &entity.name,
                    &entity.email,
                    email_key,
                    &entity.address,
                    &entity.phone_number,
                    entity.birth_date,
                    entity.status.as_str(),
                    entity.last_sequence,
                    entity.last_event_at,
                    entity.needs_backfill,
                ),
            )
            .await
            .context("Failed to upsert customer_read row")?;

        Ok(())
    }

    async fn find_tombstone(&self, customer_id: Uuid) -> Result<Option<Tombstone>, RepositoryError> {
        CUSTOMER.find(&self.session, customer_id).await
    }

    async fn tombstone(&self, tombstone: &Tombstone) -> Result<bool, RepositoryError> {
        CUSTOMER.write(&self.session, tombstone).await
    }
}
