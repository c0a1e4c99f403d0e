/// Transport port - what the connection session needs from the Bluetooth stack
///
/// The BlueZ implementation lives in `bluer_transport`; tests drive the
/// session through a scripted in-memory peripheral instead.
use bluer::{Address, Uuid};
use futures_util::stream::BoxStream;
use std::future::Future;

use crate::error::TransportError;

/// Notification payloads in delivery order. The stream ends when the link drops.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

pub trait Transport {
    type Peripheral: Peripheral;

    /// Look for the device with the given address.
    ///
    /// Resolves to `Ok(None)` when the device did not show up within the
    /// transport's discovery window.
    fn discover(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Option<Self::Peripheral>, TransportError>>;
}

/// A discovered device and the GATT operations the session performs on it
pub trait Peripheral {
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>>;

    fn read(&self, characteristic: Uuid) -> impl Future<Output = Result<Vec<u8>, TransportError>>;

    fn write(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>>;

    /// Start notifications on a characteristic. Dropping the stream unsubscribes.
    fn subscribe(
        &self,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<NotificationStream, TransportError>>;

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>>;
}
