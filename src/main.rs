use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bank_cqrs::config::Settings;
use bank_cqrs::dlq::DeadLetterStore;
use bank_cqrs::domain::account::{AccountCommand, AccountCommandHandler, TransitionTable};
use bank_cqrs::domain::common::{Clock, SystemClock};
use bank_cqrs::domain::customer::{
    CustomerCommand, CustomerCommandHandler, CustomerDomainService, PersonalDetails, RawPassword,
    Sha256PasswordEncoder,
};
use bank_cqrs::infrastructure::postgres::{
    ensure_auth_schema, ensure_command_schema, PgAccountCommandRepository, PgAuthRepository,
    PgCustomerCommandRepository, PgDeadLetterStore, PgOutboxStore,
};
use bank_cqrs::infrastructure::scylladb::{
    ensure_read_schema, ScyllaAccountReadRepository, ScyllaCustomerReadRepository,
};
use bank_cqrs::messaging::{RedpandaClient, TopicConsumer};
use bank_cqrs::metrics::{self, Metrics};
use bank_cqrs::outbox::OutboxRelay;
use bank_cqrs::projection::{AccountProjector, CustomerProjector, ProjectionRunner};
use bank_cqrs::query::AccountQueryService;
use bank_cqrs::read_model::{AccountReadRepository, CustomerReadRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bank_cqrs=debug"))
        )
        .init();

    tracing::info!("🚀 Starting bank CQRS service");

    let settings = Settings::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // === 1. Command and auth stores (PostgreSQL) ===
    tracing::info!("Connecting to PostgreSQL...");
    let command_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.command_database_url)
        .await?;
    let auth_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.auth_database_url)
        .await?;
    ensure_command_schema(&command_pool).await?;
    ensure_auth_schema(&auth_pool).await?;

    // === 2. Read store (ScyllaDB) ===
    tracing::info!(nodes = ?settings.scylla_nodes, "Connecting to ScyllaDB...");
    let mut builder = SessionBuilder::new();
    for node in &settings.scylla_nodes {
        builder = builder.known_node(node);
    }
    let session: Session = builder.build().await?;
    ensure_read_schema(&session, &settings.read_keyspace).await?;
    let session = Arc::new(session);

    let account_reads: Arc<dyn AccountReadRepository> =
        Arc::new(ScyllaAccountReadRepository::new(session.clone()));
    let customer_reads: Arc<dyn CustomerReadRepository> =
        Arc::new(ScyllaCustomerReadRepository::new(session.clone()));

    // === 3. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // Metrics HTTP server runs on its own runtime in a background thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = settings.metrics_port;
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Metrics runtime error: {}", e);
                return;
            }
        };
        runtime.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 4. Outbox relay -> Redpanda ===
    let dead_letters: Arc<dyn DeadLetterStore> = Arc::new(PgDeadLetterStore::new(command_pool.clone()));
    let redpanda = Arc::new(RedpandaClient::new(&settings.kafka_brokers, metrics.clone())?);
    let relay = Arc::new(OutboxRelay::new(
        Arc::new(PgOutboxStore::new(command_pool.clone())),
        redpanda,
        dead_letters.clone(),
        metrics.clone(),
        clock.clone(),
        settings.relay_config(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let relay_shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move { relay.run(relay_shutdown).await }));

    // === 5. Projectors: one consumer per topic ===
    let account_runner = Arc::new(ProjectionRunner::new(
        Arc::new(AccountProjector::new(account_reads.clone())),
        dead_letters.clone(),
        metrics.clone(),
        clock.clone(),
    ));
    let customer_runner = Arc::new(ProjectionRunner::new(
        Arc::new(CustomerProjector::new(customer_reads.clone())),
        dead_letters.clone(),
        metrics.clone(),
        clock.clone(),
    ));

    let subscriptions = settings
        .topics
        .account
        .all()
        .map(|topic| (topic.to_string(), account_runner.clone()))
        .into_iter()
        .chain(settings.topics.customer.all().map(|topic| (topic.to_string(), customer_runner.clone())));

    for (topic, runner) in subscriptions {
        let group_id = format!("{}-{}", settings.consumer_group, topic);
        let consumer = TopicConsumer::new(&settings.kafka_brokers, &group_id, &topic, runner)?;
        tasks.push(tokio::spawn(consumer.run(shutdown_rx.clone())));
    }

    // === 6. Command side ===
    let transitions = if settings.strict_transitions {
        TransitionTable::standard().strict()
    } else {
        TransitionTable::standard()
    };
    tracing::info!(
        strict = settings.strict_transitions,
        unreviewed = transitions.unreviewed().len(),
        "Account transition table loaded"
    );

    let accounts = AccountCommandHandler::new(
        Arc::new(PgAccountCommandRepository::new(command_pool.clone())),
        transitions,
        clock.clone(),
        settings.topics.account.clone(),
    );
    let customers = CustomerCommandHandler::new(
        Arc::new(PgCustomerCommandRepository::new(command_pool.clone())),
        Arc::new(PgAuthRepository::new(auth_pool.clone())),
        CustomerDomainService::new(customer_reads.clone()),
        Arc::new(Sha256PasswordEncoder),
        clock.clone(),
        settings.topics.customer.clone(),
        metrics.clone(),
    );

    // === 7. Walk one customer through the write path ===
    tracing::info!("📝 Registering a customer and opening an account via the outbox");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let customer_id = customers
        .handle(
            CustomerCommand::RegisterCustomer {
                details: PersonalDetails {
                    first_name: "Ada".to_string(),
                    middle_name: None,
                    last_name: "Lovelace".to_string(),
                    country: "UK".to_string(),
                    state: "London".to_string(),
                    city: "London".to_string(),
                    street: "12 St James's Square".to_string(),
                    postal_code: "SW1Y 4JH".to_string(),
                    phone_number: "+442071234567".to_string(),
                },
                email: format!("ada.{}@example.com", &suffix[..8]),
                raw_password: RawPassword::new("Correct-Horse#2024"),
                birth_date: NaiveDate::from_ymd_opt(1990, 12, 10)
                    .ok_or_else(|| anyhow::anyhow!("invalid birth date"))?,
            },
            uuid::Uuid::new_v4(),
        )
        .await?;
    tracing::info!("✅ Customer registered: {}", customer_id);

    let account_id = accounts
        .handle(
            AccountCommand::CreateAccount {
                customer_id,
                initial_balance: Decimal::new(10_000, 2),
                currency: "USD".to_string(),
            },
            uuid::Uuid::new_v4(),
        )
        .await?;
    tracing::info!("✅ Account opened: {}", account_id);

    // The projection is eventually consistent; give it a moment before reading back
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    let queries = AccountQueryService::new(account_reads.clone());
    match account_reads.find_by_id(account_id).await? {
        Some(row) => {
            let view = queries.find_by_account_number(&row.account_number).await?;
            tracing::info!("🔎 Read model caught up: {} holds {}", view.account_number, view.balance);
        }
        None => tracing::info!("⏳ Read model has not caught up yet"),
    }

    tracing::info!("Service running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    shutdown_tx.send(true)?;
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!("Background task failed: {}", e);
        }
    }

    tracing::info!("👋 Stopped");
    Ok(())
}

