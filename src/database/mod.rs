pub mod connection;
pub mod operations;
pub mod store;

pub use connection::RetryPolicy;
pub use store::{PostgresStore, RecordSink};
