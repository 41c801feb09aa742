use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::customer::{
    Address, AuthCredential, AuthRepository, Customer, CustomerCommandRepository, CustomerStatus, Email, Name,
    Password, PhoneNumber,
};
use crate::errors::RepositoryError;
use crate::outbox::OutboxMessage;
use super::outbox_store::insert_outbox;

pub struct PgCustomerCommandRepository {
    pool: PgPool,
}

impl PgCustomerCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_customer(row: &PgRow) -> Result<Customer, RepositoryError> {
        let first: String = row.try_get("first_name")?;
        let middle: Option<String> = row.try_get("middle_name")?;
        let last: String = row.try_get("last_name")?;
        let email: String = row.try_get("email")?;
        let phone: String = row.try_get("phone_number")?;
        let password_hash: String = row.try_get("password_hash")?;
        let status: String = row.try_get("status")?;

        let address = Address::new(
            row.try_get::<String, _>("country")?,
            row.try_get::<String, _>("state")?,
            row.try_get::<String, _>("city")?,
            row.try_get::<String, _>("street")?,
            row.try_get::<String, _>("postal_code")?,
        )
        .context("Corrupt address in customers row")?;

        Ok(Customer::reconstruct(
            row.try_get("id")?,
            Name::new(first, middle, last).context("Corrupt name in customers row")?,
            Email::new(email).context("Corrupt email in customers row")?,
            address,
            PhoneNumber::new(phone).context("Corrupt phone number in customers row")?,
            Password::from_hashed(password_hash).context("Corrupt password hash in customers row")?,
            row.try_get("birth_date")?,
            status
                .parse::<CustomerStatus>()
                .context("Corrupt status in customers row")?,
            row.try_get("version")?,
        ))
    }
}

#[async_trait]
impl CustomerCommandRepository for PgCustomerCommandRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, first_name, middle_name, last_name, email, country, state, city,
                   street, postal_code, phone_number, password_hash, birth_date, status, version
            FROM customers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_customer).transpose()
    }

    async fn insert(&self, customer: &Customer, outbox: &OutboxMessage) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (name, address) = (customer.name(), customer.address());

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, first_name, middle_name, last_name, email, country, state, city,
                street, postal_code, phone_number, password_hash, birth_date, status, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(customer.id())
        .bind(name.first())
        .bind(name.middle())
        .bind(name.last())
        .bind(customer.email().as_str())
        .bind(address.country())
        .bind(address.state())
        .bind(address.city())
        .bind(address.street())
        .bind(address.postal_code())
        .bind(customer.phone_number().as_str())
        .bind(customer.password().hash())
        .bind(customer.birth_date())
        .bind(customer.status().as_str())
        .bind(customer.version())
        .execute(&mut *tx)
        .await?;

        insert_outbox(&mut *tx, outbox).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(
        &self,
        customer: &Customer,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (name, address) = (customer.name(), customer.address());

        let result = sqlx::query(
            r#"
            UPDATE customers
            SET first_name = $3, middle_name = $4, last_name = $5, country = $6, state = $7,
                city = $8, street = $9, postal_code = $10, phone_number = $11, status = $12,
                version = $13
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(customer.id())
        .bind(expected_version)
        .bind(name.first())
        .bind(name.middle())
        .bind(name.last())
        .bind(address.country())
        .bind(address.state())
        .bind(address.city())
        .bind(address.street())
        .bind(address.postal_code())
        .bind(customer.phone_number().as_str())
        .bind(customer.status().as_str())
        .bind(customer.version())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::ConcurrencyConflict {
                aggregate_id: customer.id(),
                expected_version,
            });
        }

        insert_outbox(&mut *tx, outbox).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(
        &self,
        customer_id: Uuid,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM customers WHERE id = $1 AND version = $2")
            .bind(customer_id)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::ConcurrencyConflict {
                aggregate_id: customer_id,
                expected_version,
            });
        }

        insert_outbox(&mut *tx, outbox).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Credentials in the separate auth database.
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthRepository for PgAuthRepository {
    async fn save(&self, credential: &AuthCredential) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO auth_credentials (customer_id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (customer_id) DO UPDATE SET
                email = EXCLUDED.email,
                password_hash = EXCLUDED.password_hash
            "#,
        )
        .bind(credential.customer_id)
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, customer_id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth_credentials WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
