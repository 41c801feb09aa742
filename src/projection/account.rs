use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::account::{AccountCreated, AccountDeleted, AccountEvent, AccountStatus, AccountUpdated};
use crate::events::EventEnvelope;
use crate::read_model::{AccountReadEntity, AccountReadRepository, Tombstone};
use super::{parse_status, to_minor_units, ProjectionError, ProjectionHandler, ProjectionOutcome};

pub struct AccountProjector {
    repository: Arc<dyn AccountReadRepository>,
}

impl AccountProjector {
    pub fn new(repository: Arc<dyn AccountReadRepository>) -> Self {
        Self { repository }
    }

    pub async fn apply(&self, envelope: &EventEnvelope<AccountEvent>) -> Result<ProjectionOutcome, ProjectionError> {
        let sequence = envelope.sequence_number;
        match &envelope.event_data {
            AccountEvent::Created(event) => self.on_created(event, sequence).await,
            AccountEvent::Updated(event) => self.on_updated(event, sequence).await,
            AccountEvent::Deleted(event) => self.on_deleted(event, sequence).await,
        }
    }

    async fn is_deleted(&self, account_id: Uuid, event: &str) -> Result<bool, ProjectionError> {
        let deleted = self.repository.find_tombstone(account_id).await?.is_some();
        if deleted {
            tracing::debug!(account_id = %account_id, "{event} for deleted account ignored");
        }
        Ok(deleted)
    }

    async fn on_created(&self, event: &AccountCreated, sequence: i64) -> Result<ProjectionOutcome, ProjectionError> {
        let status: AccountStatus = parse_status(&event.status)?;
        let balance_amount = to_minor_units(event.initial_balance, &event.currency)?;

        if self.is_deleted(event.account_id, "AccountCreated").await? {
            return Ok(ProjectionOutcome::SkippedDeleted);
        }

        match self.repository.find_by_id(event.account_id).await? {
            Some(row) if !row.needs_backfill => {
                tracing::debug!(account_id = %event.account_id, "AccountCreated already applied");
                Ok(ProjectionOutcome::Duplicate)
            }
            Some(mut row) => {
                row.account_number = event.account_number.clone();
                row.customer_id = event.customer_id;
                row.created_at = Some(event.created_at);
                // the synthesized state is normally newer; keep it unless it is not
                if sequence > row.last_sequence {
                    row.balance_amount = balance_amount;
                    row.currency_code = event.currency.clone();
                    row.status = status;
                    row.updated_at = event.created_at;
                    row.last_sequence = sequence;
                    row.last_event_at = event.created_at;
                }
                row.needs_backfill = false;
                self.repository.upsert(&row).await?;

                tracing::info!(account_id = %event.account_id, "Backfill row completed by AccountCreated");
                Ok(ProjectionOutcome::Completed)
            }
            None => {
                let row = AccountReadEntity {
                    account_id: event.account_id,
                    account_number: event.account_number.clone(),
                    customer_id: event.customer_id,
                    balance_amount,
                    currency_code: event.currency.clone(),
                    status,
                    created_at: Some(event.created_at),
                    updated_at: event.created_at,
                    last_sequence: sequence,
                    last_event_at: event.created_at,
                    needs_backfill: false,
                };
                self.repository.upsert(&row).await?;

                tracing::debug!(account_id = %event.account_id, "Account read row inserted");
                Ok(ProjectionOutcome::Inserted)
            }
        }
    }

    async fn on_updated(&self, event: &AccountUpdated, sequence: i64) -> Result<ProjectionOutcome, ProjectionError> {
        let status: AccountStatus = parse_status(&event.status)?;
        let balance_amount = to_minor_units(event.balance, &event.currency)?;

        if self.is_deleted(event.account_id, "AccountUpdated").await? {
            return Ok(ProjectionOutcome::SkippedDeleted);
        }

        match self.repository.find_by_id(event.account_id).await? {
            Some(row) if sequence < row.last_sequence => {
                tracing::debug!(
                    account_id = %event.account_id,
                    event_sequence = sequence,
                    row_sequence = row.last_sequence,
                    "Skipping stale AccountUpdated"
                );
                Ok(ProjectionOutcome::SkippedStale)
            }
            Some(row) if sequence == row.last_sequence => {
                tracing::debug!(account_id = %event.account_id, sequence, "AccountUpdated already applied");
                Ok(ProjectionOutcome::Duplicate)
            }
            Some(mut row) => {
                row.account_number = event.account_number.clone();
                row.customer_id = event.customer_id;
                row.balance_amount = balance_amount;
                row.currency_code = event.currency.clone();
                row.status = status;
                row.updated_at = event.updated_at;
                row.last_sequence = sequence;
                row.last_event_at = event.updated_at;
                self.repository.upsert(&row).await?;
                Ok(ProjectionOutcome::Updated)
            }
            None => {
                let row = AccountReadEntity {
                    account_id: event.account_id,
                    account_number: event.account_number.clone(),
                    customer_id: event.customer_id,
                    balance_amount,
                    currency_code: event.currency.clone(),
                    status,
                    created_at: None,
                    updated_at: event.updated_at,
                    last_sequence: sequence,
                    last_event_at: event.updated_at,
                    needs_backfill: true,
                };
                self.repository.upsert(&row).await?;

                tracing::warn!(
                    account_id = %event.account_id,
                    "AccountUpdated for unknown account, synthesized row pending backfill"
                );
                Ok(ProjectionOutcome::Synthesized)
            }
        }
    }

    async fn on_deleted(&self, event: &AccountDeleted, sequence: i64) -> Result<ProjectionOutcome, ProjectionError> {
        if self.repository.find_tombstone(event.account_id).await?.is_some() {
            tracing::debug!(account_id = %event.account_id, "AccountDeleted already applied");
            return Ok(ProjectionOutcome::AlreadyAbsent);
        }

        let tombstone = Tombstone {
            aggregate_id: event.account_id,
            sequence_number: sequence,
            deleted_at: event.deleted_at,
        };
        if self.repository.tombstone(&tombstone).await? {
            Ok(ProjectionOutcome::Deleted)
        } else {
            tracing::debug!(account_id = %event.account_id, "AccountDeleted for absent row, tombstone recorded");
            Ok(ProjectionOutcome::AlreadyAbsent)
        }
    }
}

#[async_trait]
impl ProjectionHandler for AccountProjector {
    fn aggregate(&self) -> &'static str {
        "Account"
    }

    async fn handle(&self, payload: &str) -> Result<ProjectionOutcome, ProjectionError> {
        let envelope: EventEnvelope<AccountEvent> = serde_json::from_str(payload)?;
        self.apply(&envelope).await
    }
}
