/// SQL for the readings table
use tokio_postgres::Client;

use crate::error::StorageError;
use crate::models::PersistedRecord;

/// Quote a table name for interpolation into SQL.
///
/// Only plain identifiers are accepted, so quoting never has to escape anything.
pub fn quote_identifier(name: &str) -> Result<String, StorageError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= 63 {
        Ok(format!("\"{}\"", name))
    } else {
        Err(StorageError::InvalidTable(name.to_string()))
    }
}

pub fn create_table_statement(quoted_table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            time TIMESTAMPTZ NOT NULL,
            temp TEXT NOT NULL,
            rh TEXT NOT NULL
        )",
        quoted_table
    )
}

pub fn insert_statement(quoted_table: &str) -> String {
    format!(
        "INSERT INTO {}(time, temp, rh) VALUES ($1, $2, $3)",
        quoted_table
    )
}

pub async fn create_table(
    client: &Client,
    quoted_table: &str,
) -> Result<u64, tokio_postgres::Error> {
    client
        .execute(create_table_statement(quoted_table).as_str(), &[])
        .await
}

/// Insert one forwarded reading
pub async fn insert_record(
    client: &Client,
    quoted_table: &str,
    record: &PersistedRecord,
) -> Result<u64, tokio_postgres::Error> {
    client
        .execute(
            insert_statement(quoted_table).as_str(),
            &[&record.time, &record.temp, &record.rh],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_are_quoted() {
        assert_eq!(quote_identifier("sensordata").unwrap(), "\"sensordata\"");
        assert_eq!(quote_identifier("_lab_2").unwrap(), "\"_lab_2\"");
    }

    #[test]
    fn anything_else_is_rejected() {
        for name in ["", "2fast", "readings; DROP TABLE x", "a\"b", "tëmp"] {
            assert!(
                matches!(quote_identifier(name), Err(StorageError::InvalidTable(_))),
                "{name:?} accepted"
            );
        }
        assert!(quote_identifier(&"x".repeat(64)).is_err());
    }

    #[test]
    fn insert_targets_the_quoted_table() {
        assert_eq!(
            insert_statement("\"sensordata\""),
            "INSERT INTO \"sensordata\"(time, temp, rh) VALUES ($1, $2, $3)"
        );
    }
}
