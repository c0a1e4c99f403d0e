pub mod bluer_transport;
pub mod decoder;
pub mod identity;
pub mod session;
pub mod transport;
pub mod uuids;

pub use bluer_transport::BluerTransport;
pub use session::ConnectionSession;
pub use transport::Transport;
