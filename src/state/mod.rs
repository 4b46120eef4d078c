// state module: AppState, MongoDB initialization, and the Mongo-backed store.

use anyhow::{Context, Result};
use mongodb::Client;
use tracing::info;

use crate::{
    config::Config,
    ledger::{LedgerStore, Reconciler},
};

mod mongo;
mod seed;

pub use mongo::{Counter, MongoStore};

pub struct AppState<S = MongoStore> {
    pub ledger: Reconciler<S>,
}

impl<S: LedgerStore> AppState<S> {
    pub fn new(store: S, write_retries: u32) -> Self {
        AppState {
            ledger: Reconciler::new(store).with_write_retries(write_retries),
        }
    }

    pub fn store(&self) -> &S {
        self.ledger.store()
    }
}

pub async fn init_state(config: &Config) -> Result<AppState<MongoStore>> {
    let client = Client::with_uri_str(&config.mongodb_uri)
        .await
        .context("connecting to MongoDB")?;
    let db = client.database(&config.mongodb_db);

    seed::ensure_collections(&db).await?;
    seed::seed_courses(&db, &config.courses_file).await?;
    info!(db = %config.mongodb_db, "database ready");

    Ok(AppState::new(
        MongoStore::new(&db),
        config.ledger_write_retries,
    ))
}
