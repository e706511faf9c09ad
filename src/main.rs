//! Admin entry point: verify the journal hash chain, recover the ledger,
//! and print the reconstructed state as JSON.

use fillbook::store::{init_store, EventStore};
use fillbook::wal::{recover, Journal, SnapshotStore};
use fillbook::Config;

/// Stream name used when the event store mirrors the single local ledger.
const LEDGER_STREAM: &str = "ledger";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let journal = match Journal::open(config.journal_path()) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Failed to open journal: {}", e);
            std::process::exit(1);
        }
    };

    match journal.verify_chain() {
        Ok(records) => tracing::info!(records, "journal hash chain verified"),
        Err(e) => {
            eprintln!("Journal hash chain verification failed: {}", e);
            std::process::exit(1);
        }
    }

    let snapshot_store = match SnapshotStore::new(config.snapshot_path()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open snapshot store: {}", e);
            std::process::exit(1);
        }
    };

    let mut recovered = match recover(journal, &snapshot_store, config.starting_cash, &config.risk)
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Recovery failed: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        snapshot_seq = ?recovered.snapshot_seq,
        replayed = recovered.replayed,
        fenced = recovered.fenced,
        duplicates = recovered.duplicates,
        frozen = recovered.risk.is_frozen(),
        "recovery complete"
    );

    // With an event store configured, cross-check the recovered ledger
    // against a shadow replay of the event history.
    if let Some(db_path) = config.database_path.as_deref() {
        let pool = match init_store(db_path).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to initialize event store: {}", e);
                std::process::exit(1);
            }
        };
        let store = EventStore::new(pool);
        if let Err(e) = store
            .shadow_replay(LEDGER_STREAM, &recovered.ledger, config.starting_cash)
            .await
        {
            eprintln!("Shadow replay failed: {}", e);
            std::process::exit(1);
        }
        tracing::info!("shadow replay matches recovered ledger");
    }

    let state = match recovered.ledger.compute_state() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Recovered ledger failed invariant checks: {}", e);
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&state) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to render state: {}", e);
            std::process::exit(1);
        }
    }
}
