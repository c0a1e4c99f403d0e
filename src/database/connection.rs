use log::{debug, error};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use tokio::time::Duration;
use tokio_postgres::{Client, NoTls};
use url::Url;

use crate::error::StorageError;

/// How often and how far apart a failed write is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            wait: Duration::from_secs(2),
        }
    }
}

/// Connection string with the database selected and TLS material split out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub url: String,
    pub sslrootcert: Option<String>,
}

impl ConnectionSettings {
    /// Build settings from a `postgres://` connection string and a database name.
    ///
    /// The database name replaces any database in the URL path. An
    /// `sslrootcert` query parameter is removed from the URL and turns on TLS
    /// verified against that CA file.
    pub fn parse(connection_string: &str, database: &str) -> Result<Self, StorageError> {
        let mut url = Url::parse(connection_string)
            .map_err(|e| StorageError::InvalidConnectionString(format!("URL parse error: {}", e)))?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(StorageError::InvalidConnectionString(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }
        if database.is_empty() {
            return Err(StorageError::InvalidConnectionString(
                "database name is empty".into(),
            ));
        }

        let sslrootcert = url
            .query_pairs()
            .find(|(key, _)| key == "sslrootcert")
            .map(|(_, value)| value.into_owned());

        // Other parameters are kept exactly as written, still percent-encoded
        let kept: Vec<String> = url
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some("sslrootcert"))
            .map(str::to_owned)
            .collect();
        let query = kept.join("&");
        url.set_query(if query.is_empty() { None } else { Some(query.as_str()) });
        url.set_path(&format!("/{}", database));

        Ok(ConnectionSettings {
            url: url.to_string(),
            sslrootcert,
        })
    }
}

pub fn create_ssl_connector(sslrootcert_path: &str) -> Result<MakeTlsConnector, StorageError> {
    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|e| StorageError::Connection(format!("SSL builder error: {}", e)))?;

    builder
        .set_ca_file(sslrootcert_path)
        .map_err(|e| StorageError::Connection(format!("Error loading CA cert: {}", e)))?;

    builder.set_verify(SslVerifyMode::PEER);

    Ok(MakeTlsConnector::new(builder.build()))
}

/// Open a client and drive its connection on a background task
pub async fn connect(settings: &ConnectionSettings) -> Result<Client, StorageError> {
    let client = match &settings.sslrootcert {
        Some(path) => {
            let connector = create_ssl_connector(path)?;
            let (client, connection) = tokio_postgres::connect(&settings.url, connector)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            client
        }
        None => {
            let (client, connection) = tokio_postgres::connect(&settings.url, NoTls)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            client
        }
    };

    debug!("Database connection established");
    Ok(client)
}
