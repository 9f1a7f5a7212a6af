// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use registrar::api::AppState;
use registrar::archive::HttpArchiveClient;
use registrar::config::Config;
use registrar::journal::{EventJournal, JournalError};
use registrar::ledger::{LcdClient, RemoteSigner};
use registrar::reconciler::ResultReconciler;
use registrar::sequence_cache::SequenceCache;
use registrar::storage;
use registrar::tx_sequencer::TxSequencer;
use registrar::workflow::Registrar;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let storage = storage::Storage::open(&config.db_path, &config.sqlite_synchronous)?;
    let (journal, publisher) = EventJournal::new(storage, config.journal_config());
    let (mut journal_handle, journal_stop) = journal.spawn();

    let ledger = Arc::new(LcdClient::new(&config.lcd_url, config.http_timeout)?);
    let signer = Arc::new(RemoteSigner::new(&config.signer_url, config.http_timeout)?);
    let cache = Arc::new(SequenceCache::new(ledger.clone(), signer.clone()));
    let sequencer = Arc::new(TxSequencer::new(
        cache,
        ledger.clone(),
        config.sequencer_config(),
    ));
    let reconciler = Arc::new(ResultReconciler::new(ledger, config.reconcile));

    let mut registrar = Registrar::new(
        signer,
        sequencer,
        reconciler,
        Arc::new(publisher),
        config.workflow_config(),
    );
    if let Some(archive_url) = config.archive_url.as_deref() {
        if config.archive_target_address.is_none() {
            tracing::warn!("archive configured without a payment target, paid uploads will be refused");
        }
        registrar = registrar.with_archive(Arc::new(HttpArchiveClient::new(
            archive_url,
            config.http_timeout,
        )?));
        tracing::info!(url = %archive_url, "archive service enabled");
    }

    let state = Arc::new(AppState {
        registrar: Arc::new(registrar),
        db_path: config.db_path.clone(),
        sqlite_synchronous: config.sqlite_synchronous.clone(),
    });

    let app = registrar::api::router(state, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;

    tracing::info!(
        address = %config.http_addr,
        chain_id = %config.chain_id,
        chain_upgrading = config.chain_upgrading,
        "listening"
    );
    tokio::select! {
        server_result = axum::serve(listener, app) => {
            journal_stop.request_shutdown();
            let journal_result = journal_handle.await;
            match journal_result {
                Ok(JournalError::ShutdownRequested) => {}
                Ok(err) => return Err(format!("event journal exited during shutdown: {err}").into()),
                Err(join_err) => {
                    return Err(format!("event journal join error during shutdown: {join_err}").into())
                }
            }
            server_result?;
        }
        journal_result = &mut journal_handle => {
            match journal_result {
                Ok(err) => return Err(format!("event journal exited: {err}").into()),
                Err(join_err) => {
                    return Err(format!("event journal join error: {join_err}").into())
                }
            }
        }
    }

    Ok(())
}
