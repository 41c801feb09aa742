use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::dlq::{DeadLetter, DeadLetterStore, DlqStats};
use crate::domain::account::{Account, AccountCommandRepository};
use crate::domain::customer::{AuthCredential, AuthRepository, Customer, CustomerCommandRepository, Email};
use crate::errors::RepositoryError;
use crate::messaging::EventPublisher;
use crate::outbox::{OutboxMessage, OutboxStore};
use crate::read_model::{
    AccountReadEntity, AccountReadRepository, CustomerReadEntity, CustomerReadRepository, Tombstone,
};

// ============================================================================
// In-Memory Adapters
// ============================================================================
//
// Same contracts as the PostgreSQL / ScyllaDB / Kafka adapters, backed by
// maps behind tokio locks. The command store keeps aggregates and their
// outbox rows under one lock so every write is atomic like a transaction.
// Read repositories and the auth store can be told to fail writes.
//
// ============================================================================

fn injected_failure(store: &str) -> RepositoryError {
    RepositoryError::Backend(anyhow!("{store} unavailable (injected failure)"))
}

// ----------------------------------------------------------------------------
// Command store + outbox
// ----------------------------------------------------------------------------

#[derive(Default)]
struct CommandState {
    accounts: HashMap<Uuid, Account>,
    customers: HashMap<Uuid, Customer>,
    /// Insertion order is relay order
    outbox: Vec<OutboxMessage>,
}

#[derive(Default)]
pub struct InMemoryCommandStore {
    state: Mutex<CommandState>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account(&self, id: Uuid) -> Option<Account> {
        self.state.lock().await.accounts.get(&id).cloned()
    }

    pub async fn customer(&self, id: Uuid) -> Option<Customer> {
        self.state.lock().await.customers.get(&id).cloned()
    }

    pub async fn customer_count(&self) -> usize {
        self.state.lock().await.customers.len()
    }

    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.clone()
    }
}

fn conflict(aggregate_id: Uuid, expected_version: i64) -> RepositoryError {
    RepositoryError::ConcurrencyConflict { aggregate_id, expected_version }
}

#[async_trait]
impl AccountCommandRepository for InMemoryCommandStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        Ok(self.account(id).await)
    }

    async fn insert(&self, account: &Account, outbox: &OutboxMessage) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.id()) {
            return Err(RepositoryError::UniqueViolation("accounts_pkey".into()));
        }
        if state
            .accounts
            .values()
            .any(|existing| existing.account_number() == account.account_number())
        {
            return Err(RepositoryError::UniqueViolation("accounts_account_number_key".into()));
        }

        state.accounts.insert(account.id(), account.clone());
        state.outbox.push(outbox.clone());
        Ok(())
    }

    async fn update(
        &self,
        account: &Account,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        match state.accounts.get(&account.id()) {
            Some(current) if current.version() == expected_version => {}
            _ => return Err(conflict(account.id(), expected_version)),
        }

        state.accounts.insert(account.id(), account.clone());
        state.outbox.push(outbox.clone());
        Ok(())
    }
}

#[async_trait]
impl CustomerCommandRepository for InMemoryCommandStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customer(id).await)
    }

    async fn insert(&self, customer: &Customer, outbox: &OutboxMessage) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.customers.values().any(|existing| existing.email() == customer.email()) {
            return Err(RepositoryError::UniqueViolation("customers_email_key".into()));
        }

        state.customers.insert(customer.id(), customer.clone());
        state.outbox.push(outbox.clone());
        Ok(())
    }

    async fn update(
        &self,
        customer: &Customer,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        match state.customers.get(&customer.id()) {
            Some(current) if current.version() == expected_version => {}
            _ => return Err(conflict(customer.id(), expected_version)),
        }

        state.customers.insert(customer.id(), customer.clone());
        state.outbox.push(outbox.clone());
        Ok(())
    }

    async fn delete(
        &self,
        customer_id: Uuid,
        expected_version: i64,
        outbox: &OutboxMessage,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        match state.customers.get(&customer_id) {
            Some(current) if current.version() == expected_version => {}
            _ => return Err(conflict(customer_id, expected_version)),
        }

        state.customers.remove(&customer_id);
        state.outbox.push(outbox.clone());
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryCommandStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .filter(|message| message.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let message = state
            .outbox
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        message.published_at = Some(at);
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<i32, RepositoryError> {
        let mut state = self.state.lock().await;
        let message = state
            .outbox
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        message.attempts += 1;
        message.last_error = Some(error.to_string());
        Ok(message.attempts)
    }

    async fn mark_dead_lettered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let message = state
            .outbox
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        message.dead_lettered_at = Some(at);
        Ok(())
    }

    async fn dead_lettered_aggregates(&self, aggregate_ids: &[Uuid]) -> Result<HashSet<Uuid>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .filter(|message| message.dead_lettered_at.is_some() && aggregate_ids.contains(&message.aggregate_id))
            .map(|message| message.aggregate_id)
            .collect())
    }
}

// ----------------------------------------------------------------------------
// Auth store
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryAuthRepository {
    credentials: RwLock<HashMap<Uuid, AuthCredential>>,
    failing: AtomicBool,
}

impl InMemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write (save and delete) fail until switched off.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn credential(&self, customer_id: Uuid) -> Option<AuthCredential> {
        self.credentials.read().await.get(&customer_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }
}

#[async_trait]
impl AuthRepository for InMemoryAuthRepository {
    async fn save(&self, credential: &AuthCredential) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure("auth store"));
        }
        self.credentials
            .write()
            .await
            .insert(credential.customer_id, credential.clone());
        Ok(())
    }

    async fn delete(&self, customer_id: Uuid) -> Result<bool, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure("auth store"));
        }
        Ok(self.credentials.write().await.remove(&customer_id).is_some())
    }
}

// ----------------------------------------------------------------------------
// Read store
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryAccountReadRepository {
    rows: RwLock<HashMap<Uuid, AccountReadEntity>>,
    tombstones: RwLock<HashMap<Uuid, Tombstone>>,
    failing: AtomicBool,
}

impl InMemoryAccountReadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Live rows only
    pub async fn len(&self) -> usize {
        let tombstones = self.tombstones.read().await;
        self.rows
            .read()
            .await
            .keys()
            .filter(|id| !tombstones.contains_key(id))
            .count()
    }
}

#[async_trait]
impl AccountReadRepository for InMemoryAccountReadRepository {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<AccountReadEntity>, RepositoryError> {
        if self.tombstones.read().await.contains_key(&account_id) {
            return Ok(None);
        }
        Ok(self.rows.read().await.get(&account_id).cloned())
    }

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<AccountReadEntity>, RepositoryError> {
        let tombstones = self.tombstones.read().await;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|row| row.account_number == account_number && !tombstones.contains_key(&row.account_id))
            .cloned())
    }

    async fn upsert(&self, entity: &AccountReadEntity) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure("read store"));
        }
        self.rows.write().await.insert(entity.account_id, entity.clone());
        Ok(())
    }

    async fn find_tombstone(&self, account_id: Uuid) -> Result<Option<Tombstone>, RepositoryError> {
        Ok(self.tombstones.read().await.get(&account_id).cloned())
    }

    async fn tombstone(&self, tombstone: &Tombstone) -> Result<bool, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure("read store"));
        }
        self.tombstones
            .write()
            .await
            .entry(tombstone.aggregate_id)
            .or_insert_with(|| tombstone.clone());
        Ok(self.rows.write().await.remove(&tombstone.aggregate_id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerReadRepository {
    rows: RwLock<HashMap<Uuid, CustomerReadEntity>>,
    tombstones: RwLock<HashMap<Uuid, Tombstone>>,
    failing: AtomicBool,
}

impl InMemoryCustomerReadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Live rows only
    pub async fn len(&self) -> usize {
        let tombstones = self.tombstones.read().await;
        self.rows
            .read()
            .await
            .keys()
            .filter(|id| !tombstones.contains_key(id))
            .count()
    }
}

#[async_trait]
impl CustomerReadRepository for InMemoryCustomerReadRepository {
    async fn find_by_id(&self, customer_id: Uuid) -> Result<Option<CustomerReadEntity>, RepositoryError> {
        if self.tombstones.read().await.contains_key(&customer_id) {
            return Ok(None);
        }
        Ok(self.rows.read().await.get(&customer_id).cloned())
    }

    async fn exists_by_email(&self, email: &Email) -> Result<bool, RepositoryError> {
        let tombstones = self.tombstones.read().await;
        Ok(self.rows.read().await.values().any(|row| {
            !tombstones.contains_key(&row.customer_id)
                && row
                    .email
                    .as_deref()
                    .is_some_and(|stored| stored.eq_ignore_ascii_case(email.as_str()))
        }))
    }

    async fn upsert(&self, entity: &CustomerReadEntity) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure("read store"));
        }
        self.rows.write().await.insert(entity.customer_id, entity.clone());
        Ok(())
    }

    async fn find_tombstone(&self, customer_id: Uuid) -> Result<Option<Tombstone>, RepositoryError> {
        Ok(self.tombstones.read().await.get(&customer_id).cloned())
    }

    async fn tombstone(&self, tombstone: &Tombstone) -> Result<bool, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure("read store"));
        }
        self.tombstones
            .write()
            .await
            .entry(tombstone.aggregate_id)
            .or_insert_with(|| tombstone.clone());
        Ok(self.rows.write().await.remove(&tombstone.aggregate_id).is_some())
    }
}

// ----------------------------------------------------------------------------
// Dead letters
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    letters: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest first.
    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().await.clone()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn add(&self, letter: &DeadLetter) -> Result<(), RepositoryError> {
        self.letters.lock().await.push(letter.clone());
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>, RepositoryError> {
        let letters = self.letters.lock().await;
        Ok(letters.iter().rev().take(limit).cloned().collect())
    }

    async fn stats(&self) -> Result<DlqStats, RepositoryError> {
        Ok(DlqStats::from_letters(self.letters.lock().await.iter()))
    }
}

// ----------------------------------------------------------------------------
// Broker
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

#[derive(Default)]
struct BusState {
    published: Vec<PublishedMessage>,
    /// Index of the first message not yet handed out by `drain`
    delivered: usize,
    failing_keys: HashSet<String>,
}

/// Records everything published. Publishes for selected keys can be made
/// to fail.
#[derive(Default)]
pub struct InMemoryEventBus {
    state: Mutex<BusState>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in publish order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().await.published.clone()
    }

    /// Messages published since the previous call.
    pub async fn drain(&self) -> Vec<PublishedMessage> {
        let mut state = self.state.lock().await;
        let fresh = state.published[state.delivered..].to_vec();
        state.delivered += fresh.len();
        fresh
    }

    pub async fn fail_for_key(&self, key: &str) {
        self.state.lock().await.failing_keys.insert(key.to_string());
    }

    pub async fn heal(&self) {
        self.state.lock().await.failing_keys.clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.failing_keys.contains(key) {
            anyhow::bail!("broker rejected message for key {key}");
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::DeadLetterSource;

    #[tokio::test]
    async fn test_drain_only_returns_new_messages() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", "k1", "a").await.unwrap();
        assert_eq!(bus.drain().await.len(), 1);

        bus.publish("t", "k2", "b").await.unwrap();
        let fresh = bus.drain().await;
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].key, "k2");
        assert_eq!(bus.published().await.len(), 2);
    }

    #[tokio::test]
    async fn test_dead_letters_list_newest_first() {
        let store = InMemoryDeadLetterStore::new();
        let now = Utc::now();
        for event_type in ["A", "B", "C"] {
            let letter = DeadLetter::single_failure(DeadLetterSource::Relay, None, event_type, "{}", "boom", now);
            store.add(&letter).await.unwrap();
        }

        let listed: Vec<String> = store.list(2).await.unwrap().into_iter().map(|l| l.event_type).collect();
        assert_eq!(listed, ["C", "B"]);
        assert_eq!(store.stats().await.unwrap().total_messages, 3);
    }
}
