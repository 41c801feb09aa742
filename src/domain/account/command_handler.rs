use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::common::{Clock, CurrencyCode, Money};
use crate::errors::{AppError, RepositoryError};
use crate::events::{EventEnvelope, TopicSet};
use crate::outbox::OutboxMessage;

use super::aggregate::Account;
use super::commands::AccountCommand;
use super::errors::AccountError;
use super::events::AccountEvent;
use super::repository::AccountCommandRepository;
use super::transitions::TransitionTable;
use super::value_objects::AccountStatus;

// ============================================================================
// Account Command Handler
// ============================================================================
//
// Orchestrates: Command -> validation -> Aggregate -> (row + outbox) write
//
// ============================================================================

/// Account numbers are random; a collision is retried with a fresh number.
const ACCOUNT_NUMBER_ATTEMPTS: usize = 3;

pub struct AccountCommandHandler {
    repository: Arc<dyn AccountCommandRepository>,
    transitions: TransitionTable,
    clock: Arc<dyn Clock>,
    topics: TopicSet,
}

impl AccountCommandHandler {
    pub fn new(
        repository: Arc<dyn AccountCommandRepository>,
        transitions: TransitionTable,
        clock: Arc<dyn Clock>,
        topics: TopicSet,
    ) -> Self {
        Self {
            repository,
            transitions,
            clock,
            topics,
        }
    }

    /// Handle a command and return the id of the affected account
    pub async fn handle(&self, command: AccountCommand, correlation_id: Uuid) -> Result<Uuid, AppError> {
        tracing::info!(
            command = command.name(),
            correlation_id = %correlation_id,
            "Handling account command"
        );

        match command {
            AccountCommand::CreateAccount { customer_id, initial_balance, currency } => {
                self.create_account(customer_id, initial_balance, &currency, correlation_id).await
            }
            AccountCommand::UpdateAccountStatus { account_id, new_status } => {
                self.update_status(account_id, &new_status, correlation_id).await
            }
            AccountCommand::Deposit { account_id, amount, currency } => {
                let amount = money(amount, &currency)?;
                let account = self.load_active(account_id).await?;
                let next = account.deposit(&amount, self.clock.as_ref())?;
                self.save(&account, &next, correlation_id).await
            }
            AccountCommand::Withdraw { account_id, amount, currency } => {
                let amount = money(amount, &currency)?;
                let account = self.load_active(account_id).await?;
                let next = account.withdraw(&amount, self.clock.as_ref())?;
                self.save(&account, &next, correlation_id).await
            }
        }
    }

    async fn create_account(
        &self,
        customer_id: Uuid,
        initial_balance: Decimal,
        currency: &str,
        correlation_id: Uuid,
    ) -> Result<Uuid, AppError> {
        let initial_balance = money(initial_balance, currency)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let account = Account::open(customer_id, initial_balance.clone(), self.clock.as_ref())?;
            let outbox = self.outbox_message(&account, AccountEvent::created(&account), correlation_id)?;

            match self.repository.insert(&account, &outbox).await {
                Ok(()) => {
                    tracing::info!(
                        account_id = %account.id(),
                        account_number = %account.account_number(),
                        customer_id = %customer_id,
                        "Account opened"
                    );
                    return Ok(account.id());
                }
                Err(RepositoryError::UniqueViolation(constraint)) if attempt < ACCOUNT_NUMBER_ATTEMPTS => {
                    tracing::warn!(
                        account_number = %account.account_number(),
                        constraint = %constraint,
                        attempt,
                        "Account number collision, retrying with a new number"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn update_status(
        &self,
        account_id: Uuid,
        new_status: &str,
        correlation_id: Uuid,
    ) -> Result<Uuid, AppError> {
        let requested: AccountStatus = new_status.parse()?;
        let account = self.load(account_id).await?;

        self.transitions.check(account.status(), requested)?;
        let next = account.change_status(requested, self.clock.as_ref())?;

        tracing::info!(
            account_id = %account_id,
            from = %account.status(),
            to = %requested,
            "Account status changed"
        );
        self.save(&account, &next, correlation_id).await
    }

    async fn load(&self, account_id: Uuid) -> Result<Account, AppError> {
        self.repository
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::not_found("Account", account_id))
    }

    async fn load_active(&self, account_id: Uuid) -> Result<Account, AppError> {
        let account = self.load(account_id).await?;
        if account.status() != AccountStatus::Active {
            return Err(AccountError::NotActive(account.status()).into());
        }
        Ok(account)
    }

    async fn save(&self, current: &Account, next: &Account, correlation_id: Uuid) -> Result<Uuid, AppError> {
        let outbox = self.outbox_message(next, AccountEvent::updated(next), correlation_id)?;
        self.repository.update(next, current.version(), &outbox).await?;
        Ok(next.id())
    }

    fn outbox_message(
        &self,
        account: &Account,
        event: AccountEvent,
        correlation_id: Uuid,
    ) -> Result<OutboxMessage, AppError> {
        let timestamp = event.occurred_at();
        let envelope = EventEnvelope::new(account.id(), account.version(), event, correlation_id, timestamp);
        let topic = self.topics.for_kind(envelope.kind());
        Ok(OutboxMessage::from_envelope(&envelope, topic)?)
    }
}

fn money(amount: Decimal, currency: &str) -> Result<Money, AppError> {
    Ok(Money::of(amount, CurrencyCode::new(currency)?))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::common::FixedClock;
    use crate::errors::ErrorKind;
    use crate::infrastructure::memory::InMemoryCommandStore;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    struct Fixture {
        repository: Arc<InMemoryCommandStore>,
        handler: AccountCommandHandler,
    }

    fn fixture() -> Fixture {
        fixture_with(TransitionTable::standard())
    }

    fn fixture_with(transitions: TransitionTable) -> Fixture {
        let repository = Arc::new(InMemoryCommandStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        let handler = AccountCommandHandler::new(
            repository.clone(),
            transitions,
            clock,
            TopicSet::with_prefix("account"),
        );
        Fixture { repository, handler }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn open(fx: &Fixture, balance: &str) -> Uuid {
        fx.handler
            .handle(
                AccountCommand::CreateAccount {
                    customer_id: Uuid::new_v4(),
                    initial_balance: dec(balance),
                    currency: "USD".into(),
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap()
    }

    async fn set_status(fx: &Fixture, id: Uuid, status: &str) -> Result<Uuid, AppError> {
        fx.handler
            .handle(
                AccountCommand::UpdateAccountStatus { account_id: id, new_status: status.into() },
                Uuid::new_v4(),
            )
            .await
    }

    #[tokio::test]
    async fn test_create_account_writes_row_and_created_event() {
        let fx = fixture();
        let id = open(&fx, "100.00").await;

        let stored = fx.repository.account(id).await.unwrap();
        assert_eq!(stored.balance().to_string(), "100.00 USD");
        assert_eq!(stored.status(), AccountStatus::Active);

        let outbox = fx.repository.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].topic, "account-created");
        assert_eq!(outbox[0].event_type, "AccountCreated");
        assert_eq!(outbox[0].partition_key, id.to_string());
    }

    #[tokio::test]
    async fn test_create_account_validates_input() {
        let fx = fixture();
        let bad_currency = fx
            .handler
            .handle(
                AccountCommand::CreateAccount {
                    customer_id: Uuid::new_v4(),
                    initial_balance: dec("1"),
                    currency: "dollars".into(),
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();
        assert_eq!(bad_currency.kind(), ErrorKind::Validation);

        let negative = fx
            .handler
            .handle(
                AccountCommand::CreateAccount {
                    customer_id: Uuid::new_v4(),
                    initial_balance: dec("-1"),
                    currency: "USD".into(),
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();
        assert_eq!(negative.kind(), ErrorKind::Validation);
        assert!(fx.repository.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_closed_account_cannot_be_reactivated() {
        let fx = fixture();
        let id = open(&fx, "100.00").await;

        set_status(&fx, id, "CLOSED").await.unwrap();
        let error = set_status(&fx, id, "ACTIVE").await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Conflict);
        let stored = fx.repository.account(id).await.unwrap();
        assert_eq!(stored.status(), AccountStatus::Closed);
        assert_eq!(stored.balance().to_string(), "100.00 USD");
        // created + one update, nothing for the rejected command
        assert_eq!(fx.repository.outbox().await.len(), 2);
    }

    #[tokio::test]
    async fn test_status_update_error_kinds() {
        let fx = fixture();
        let id = open(&fx, "1").await;

        assert_eq!(set_status(&fx, id, "OPEN").await.unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(set_status(&fx, id, "ACTIVE").await.unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(
            set_status(&fx, Uuid::new_v4(), "CLOSED").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_strict_table_rejects_unreviewed_transition() {
        let fx = fixture_with(TransitionTable::standard().strict());
        let id = open(&fx, "1").await;
        assert_eq!(set_status(&fx, id, "SUSPENDED").await.unwrap_err().kind(), ErrorKind::Conflict);

        let lenient = fixture();
        let id = open(&lenient, "1").await;
        assert!(set_status(&lenient, id, "SUSPENDED").await.is_ok());
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw() {
        let fx = fixture();
        let id = open(&fx, "100.00").await;

        fx.handler
            .handle(AccountCommand::Deposit { account_id: id, amount: dec("20"), currency: "USD".into() }, Uuid::new_v4())
            .await
            .unwrap();
        fx.handler
            .handle(AccountCommand::Withdraw { account_id: id, amount: dec("70.50"), currency: "USD".into() }, Uuid::new_v4())
            .await
            .unwrap();

        let stored = fx.repository.account(id).await.unwrap();
        assert_eq!(stored.balance().to_string(), "49.50 USD");
        assert_eq!(stored.version(), 3);

        let overdraw = fx
            .handler
            .handle(AccountCommand::Withdraw { account_id: id, amount: dec("49.51"), currency: "USD".into() }, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(overdraw.kind(), ErrorKind::Conflict);
        assert_eq!(fx.repository.account(id).await.unwrap().balance().to_string(), "49.50 USD");
    }

    #[tokio::test]
    async fn test_money_movement_requires_active_account() {
        let fx = fixture();
        let id = open(&fx, "10").await;
        set_status(&fx, id, "FROZEN").await.unwrap();

        let error = fx
            .handler
            .handle(AccountCommand::Deposit { account_id: id, amount: dec("1"), currency: "USD".into() }, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict_and_writes_nothing() {
        let fx = fixture();
        let id = open(&fx, "10").await;
        let stale = fx.repository.account(id).await.unwrap();

        set_status(&fx, id, "FROZEN").await.unwrap();

        let clock = FixedClock::new(Utc::now());
        let racing = stale.change_status(AccountStatus::Dormant, &clock).unwrap();
        let event = AccountEvent::updated(&racing);
        let envelope = EventEnvelope::new(id, racing.version(), event, Uuid::new_v4(), clock.now());
        let outbox = OutboxMessage::from_envelope(&envelope, "account-updated").unwrap();

        let result = fx.repository.update(&racing, stale.version(), &outbox).await;
        assert!(matches!(result, Err(RepositoryError::ConcurrencyConflict { .. })));
        assert_eq!(fx.repository.account(id).await.unwrap().status(), AccountStatus::Frozen);
        assert_eq!(fx.repository.outbox().await.len(), 2);
    }
}
