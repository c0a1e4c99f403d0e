/// In-memory stand-ins for the Bluetooth stack, the store and the clock
use bluer::{Address, Uuid};
use futures_util::{future, stream, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};
use tokio::sync::watch;

use crate::bluetooth::transport::{NotificationStream, Peripheral, Transport};
use crate::bluetooth::uuids;
use crate::clock::Clock;
use crate::database::RecordSink;
use crate::error::{StorageError, TransportError};
use crate::models::PersistedRecord;

pub fn sensor_address() -> Address {
    Address([0x24, 0x71, 0x89, 0xbc, 0x63, 0x84])
}

/// What a scripted notification stream does once its payloads are delivered
pub enum AfterBatch {
    /// End the stream, as a dropped link does
    End,
    /// Request shutdown, then stay open
    Shutdown(watch::Sender<bool>),
}

#[derive(Default)]
struct FakeState {
    values: HashMap<Uuid, Vec<u8>>,
    missing: HashSet<Uuid>,
    refuse_connect: bool,
    refuse_write: bool,
    refuse_subscribe: bool,
    batches: VecDeque<(Vec<Vec<u8>>, AfterBatch)>,
    interrupt: Option<(Uuid, watch::Sender<bool>)>,
    calls: Vec<String>,
}

/// Scripted peripheral. Clones share state, so a test can keep one to
/// inspect the calls made through the copy handed to the session.
#[derive(Clone, Default)]
pub struct FakePeripheral {
    state: Arc<Mutex<FakeState>>,
}

impl FakePeripheral {
    /// A CC2650 SensorTag answering every identification read
    pub fn sensortag() -> Self {
        let peripheral = FakePeripheral::default();
        {
            let mut state = peripheral.state.lock().unwrap();
            let values = &mut state.values;
            values.insert(
                uuids::SYSTEM_ID,
                vec![0x84, 0xe6, 0xf7, 0xfe, 0xff, 0x22, 0x91, 0xb0],
            );
            values.insert(uuids::MODEL_NUMBER, b"CC2650 SensorTag\0".to_vec());
            values.insert(uuids::DEVICE_NAME, b"CC2650 SensorTag".to_vec());
            values.insert(uuids::MANUFACTURER_NAME, b"Texas Instruments\0".to_vec());
            values.insert(uuids::FIRMWARE_REVISION, b"1.30 (May 23 2016)".to_vec());
            values.insert(uuids::HARDWARE_REVISION, b"PCB 1.2/1.3".to_vec());
            values.insert(uuids::SOFTWARE_REVISION, b"N.A.".to_vec());
            values.insert(uuids::BATTERY_LEVEL, vec![87]);
        }
        peripheral
    }

    /// Make reads of `uuid` fail
    pub fn without(self, uuid: Uuid) -> Self {
        self.state.lock().unwrap().missing.insert(uuid);
        self
    }

    pub fn with_value(self, uuid: Uuid, value: Vec<u8>) -> Self {
        self.state.lock().unwrap().values.insert(uuid, value);
        self
    }

    /// Queue the notifications delivered by the next subscribe call
    pub fn with_batch(self, payloads: Vec<Vec<u8>>, after: AfterBatch) -> Self {
        self.state
            .lock()
            .unwrap()
            .batches
            .push_back((payloads, after));
        self
    }

    pub fn refuse_connect(self) -> Self {
        self.state.lock().unwrap().refuse_connect = true;
        self
    }

    pub fn refuse_write(self) -> Self {
        self.state.lock().unwrap().refuse_write = true;
        self
    }

    pub fn refuse_subscribe(self) -> Self {
        self.state.lock().unwrap().refuse_subscribe = true;
        self
    }

    /// Request shutdown when `uuid` is read or written, and never answer that call
    pub fn interrupt_at(self, uuid: Uuid, shutdown: watch::Sender<bool>) -> Self {
        self.state.lock().unwrap().interrupt = Some((uuid, shutdown));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Fires the interrupt if it is set for `uuid`. Returns whether it fired.
    fn interrupted(&self, uuid: Uuid) -> bool {
        let mut state = self.state.lock().unwrap();
        let hit = matches!(&state.interrupt, Some((at, _)) if *at == uuid);
        if !hit {
            return false;
        }
        if let Some((_, shutdown)) = state.interrupt.take() {
            let _ = shutdown.send(true);
        }
        true
    }
}

impl Peripheral for FakePeripheral {
    async fn connect(&self) -> Result<(), TransportError> {
        self.log("connect".into());
        if self.state.lock().unwrap().refuse_connect {
            return Err(TransportError::Rejected("connection refused".into()));
        }
        Ok(())
    }

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        self.log(format!("read {}", uuid));
        if self.interrupted(uuid) {
            return future::pending().await;
        }
        let state = self.state.lock().unwrap();
        if state.missing.contains(&uuid) {
            return Err(TransportError::CharacteristicNotFound(uuid));
        }
        state
            .values
            .get(&uuid)
            .cloned()
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }

    async fn write(&self, uuid: Uuid, value: &[u8]) -> Result<(), TransportError> {
        self.log(format!("write {} {:02x?}", uuid, value));
        if self.interrupted(uuid) {
            return future::pending().await;
        }
        if self.state.lock().unwrap().refuse_write {
            return Err(TransportError::Rejected("write not permitted".into()));
        }
        Ok(())
    }

    async fn subscribe(&self, uuid: Uuid) -> Result<NotificationStream, TransportError> {
        self.log(format!("subscribe {}", uuid));
        let mut state = self.state.lock().unwrap();
        if state.refuse_subscribe {
            return Err(TransportError::Rejected("notify not permitted".into()));
        }

        let Some((payloads, after)) = state.batches.pop_front() else {
            return Ok(stream::pending::<Vec<u8>>().boxed());
        };
        let delivered = stream::iter(payloads);
        Ok(match after {
            AfterBatch::End => delivered.boxed(),
            AfterBatch::Shutdown(shutdown) => delivered
                .chain(stream::once(async move {
                    let _ = shutdown.send(true);
                    future::pending::<Vec<u8>>().await
                }))
                .boxed(),
        })
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.log("disconnect".into());
        Ok(())
    }
}

/// Transport that finds the scripted peripheral, or nothing
pub struct FakeTransport {
    peripheral: Option<FakePeripheral>,
    discoveries: AtomicU32,
}

impl FakeTransport {
    pub fn new(peripheral: FakePeripheral) -> Self {
        FakeTransport {
            peripheral: Some(peripheral),
            discoveries: AtomicU32::new(0),
        }
    }

    pub fn empty() -> Self {
        FakeTransport {
            peripheral: None,
            discoveries: AtomicU32::new(0),
        }
    }

    pub fn discoveries(&self) -> u32 {
        self.discoveries.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    type Peripheral = FakePeripheral;

    async fn discover(&self, address: Address) -> Result<Option<FakePeripheral>, TransportError> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        if address != sensor_address() {
            return Ok(None);
        }
        Ok(self.peripheral.clone())
    }
}

/// Sink keeping every stored record, optionally failing the first writes
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<PersistedRecord>>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
    delay: Option<std::time::Duration>,
}

impl RecordingSink {
    pub fn failing_first(failures: u32) -> Self {
        RecordingSink {
            failures_left: AtomicU32::new(failures),
            ..Default::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    /// Make every write take `delay` before it completes
    pub fn with_delay(self, delay: std::time::Duration) -> Self {
        RecordingSink {
            delay: Some(delay),
            ..self
        }
    }

    pub fn records(&self) -> Vec<PersistedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl RecordSink for RecordingSink {
    async fn store(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::WriteFailed {
                attempts: 1,
                reason: "database unavailable".into(),
            });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Clock advancing by a fixed step on every reading, starting at `start`
pub struct SteppingClock {
    start: OffsetDateTime,
    step: Duration,
    ticks: AtomicI64,
}

impl SteppingClock {
    pub fn new(start: OffsetDateTime, step: Duration) -> Self {
        SteppingClock {
            start,
            step,
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> OffsetDateTime {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.start + self.step * tick as i32
    }
}
