/// BlueZ implementation of the transport port
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Session, Uuid};
use futures_util::{pin_mut, stream, StreamExt};
use log::{debug, info, warn};
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};

use crate::bluetooth::transport::{NotificationStream, Peripheral, Transport};
use crate::error::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const GATT_TIMEOUT: Duration = Duration::from_secs(10); // per read, write and service resolution
const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct BluerTransport {
    // keeps the D-Bus connection alive
    _session: Session,
    adapter: Adapter,
    discovery_timeout: Duration,
}

impl BluerTransport {
    /// Open a BlueZ session on the default adapter and power it on
    pub async fn new(discovery_timeout: Duration) -> Result<Self, TransportError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        info!("Using Bluetooth adapter {}", adapter.name());

        Ok(BluerTransport {
            _session: session,
            adapter,
            discovery_timeout,
        })
    }
}

impl Transport for BluerTransport {
    type Peripheral = BluerPeripheral;

    async fn discover(&self, address: Address) -> Result<Option<BluerPeripheral>, TransportError> {
        let filter = bluer::DiscoveryFilter {
            transport: bluer::DiscoveryTransport::Le,
            duplicate_data: false,
            ..Default::default()
        };
        // Warn if it fails, discovery still works unfiltered
        if let Err(e) = self.adapter.set_discovery_filter(filter).await {
            warn!("Failed to set discovery filter: {}", e);
        }

        let events = self.adapter.discover_devices().await?;
        pin_mut!(events);

        let search = async {
            while let Some(event) = events.next().await {
                debug!("Discovery event: {:?}", event);
                if let AdapterEvent::DeviceAdded(found) = event {
                    if found == address {
                        return true;
                    }
                }
            }
            false
        };

        let found = timeout(self.discovery_timeout, search)
            .await
            .unwrap_or(false);
        if !found {
            return Ok(None);
        }

        let device = self.adapter.device(address)?;
        Ok(Some(BluerPeripheral { device }))
    }
}

pub struct BluerPeripheral {
    device: Device,
}

impl BluerPeripheral {
    async fn wait_services_resolved(&self) -> Result<(), TransportError> {
        with_timeout("service resolution", GATT_TIMEOUT, async {
            while !self.device.is_services_resolved().await? {
                sleep(SERVICES_POLL_INTERVAL).await;
            }
            Ok::<_, TransportError>(())
        })
        .await
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.wait_services_resolved().await?;
        for service in self.device.services().await? {
            for characteristic in service.characteristics().await? {
                if characteristic.uuid().await? == uuid {
                    return Ok(characteristic);
                }
            }
        }
        Err(TransportError::CharacteristicNotFound(uuid))
    }
}

impl Peripheral for BluerPeripheral {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.device.is_connected().await? {
            return Ok(());
        }
        with_timeout("connect", CONNECT_TIMEOUT, async {
            self.device.connect().await?;
            Ok::<_, TransportError>(())
        })
        .await
    }

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.characteristic(uuid).await?;
        with_timeout("read", GATT_TIMEOUT, async {
            Ok::<_, TransportError>(characteristic.read().await?)
        })
        .await
    }

    async fn write(&self, uuid: Uuid, value: &[u8]) -> Result<(), TransportError> {
        let characteristic = self.characteristic(uuid).await?;
        with_timeout("write", GATT_TIMEOUT, async {
            Ok::<_, TransportError>(characteristic.write(value).await?)
        })
        .await
    }

    async fn subscribe(&self, uuid: Uuid) -> Result<NotificationStream, TransportError> {
        let characteristic = self.characteristic(uuid).await?;
        if !characteristic.flags().await?.notify {
            return Err(TransportError::Rejected(format!(
                "characteristic {} does not support notifications",
                uuid
            )));
        }
        let reader = with_timeout("subscribe", GATT_TIMEOUT, async {
            Ok::<_, TransportError>(characteristic.notify_io().await?)
        })
        .await?;

        // The reader errors out once the link is gone, which ends the stream
        let notifications = stream::unfold(reader, |reader| async move {
            match reader.recv().await {
                Ok(value) => Some((value, reader)),
                Err(e) => {
                    debug!("Notification reader closed: {}", e);
                    None
                }
            }
        });
        Ok(notifications.boxed())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.device.is_connected().await? {
            self.device.disconnect().await?;
        }
        Ok(())
    }
}

async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    future: F,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    timeout(limit, future)
        .await
        .map_err(|_| TransportError::Timeout {
            operation,
            secs: limit.as_secs(),
        })?
}
