/// Storage port and its PostgreSQL implementation
///
/// The pipeline only sees `RecordSink`. `PostgresStore` keeps one client
/// around, reconnects when it has closed, and retries a failed write a bounded
/// number of times before giving up on that record.
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::Client;

use crate::database::connection::{connect, ConnectionSettings, RetryPolicy};
use crate::database::operations::{create_table, insert_record, quote_identifier};
use crate::error::StorageError;
use crate::models::PersistedRecord;

/// Destination for forwarded readings
pub trait RecordSink {
    /// Persist one record. Failures are reported to the caller, never retried by it.
    fn store(&self, record: &PersistedRecord) -> impl Future<Output = Result<(), StorageError>>;
}

pub struct PostgresStore {
    settings: ConnectionSettings,
    table: String,
    retry: RetryPolicy,
    client: Mutex<Option<Arc<Client>>>,
}

impl PostgresStore {
    /// Validate the connection parameters. No connection is opened yet.
    ///
    /// # Arguments
    /// * `connection_string` - PostgreSQL URL, optionally with `sslrootcert`
    /// * `database` - Database to write into
    /// * `table` - Table receiving the readings
    /// * `retry` - Attempts per write
    pub fn new(
        connection_string: &str,
        database: &str,
        table: &str,
        retry: RetryPolicy,
    ) -> Result<Self, StorageError> {
        Ok(PostgresStore {
            settings: ConnectionSettings::parse(connection_string, database)?,
            table: quote_identifier(table)?,
            retry,
            client: Mutex::new(None),
        })
    }

    /// Create the readings table if it does not exist yet
    pub async fn ensure_table(&self) -> Result<(), StorageError> {
        let table = self.table.clone();
        self.execute_with_retry(move |client| {
            let table = table.clone();
            async move { create_table(&client, &table).await }
        })
        .await?;
        info!("Table {} is ready", self.table);
        Ok(())
    }

    async fn client(&self) -> Result<Arc<Client>, StorageError> {
        let mut cached = self.client.lock().await;
        if let Some(client) = cached.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
            warn!("Database connection closed, reconnecting");
        }
        let client = Arc::new(connect(&self.settings).await?);
        *cached = Some(client.clone());
        Ok(client)
    }

    async fn execute_with_retry<F, Fut>(&self, operation: F) -> Result<u64, StorageError>
    where
        F: Fn(Arc<Client>) -> Fut,
        Fut: Future<Output = Result<u64, tokio_postgres::Error>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.client().await {
                Ok(client) => match operation(client).await {
                    Ok(rows) => return Ok(rows),
                    Err(e) => {
                        error!("Attempt {}: query error: {}", attempt + 1, e);
                        last_error = e.to_string();
                        // drop a client that may be wedged
                        self.client.lock().await.take();
                    }
                },
                Err(e) => {
                    error!("Attempt {}: {}", attempt + 1, e);
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.retry.wait).await;
            }
        }

        Err(StorageError::WriteFailed {
            attempts,
            reason: last_error,
        })
    }
}

impl RecordSink for PostgresStore {
    async fn store(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        let table = self.table.clone();
        let record = record.clone();
        self.execute_with_retry(move |client| {
            let table = table.clone();
            let record = record.clone();
            async move { insert_record(&client, &table, &record).await }
        })
        .await
        .map(|_| ())
    }
}
