/// Connection session for one SensorTag
///
/// Discovery, connect, identification reads, measurement subscription and
/// the receive loop, ending in `Closed` on cancellation or `Failed` on any
/// lifecycle error. The link is disconnected on every exit path past connect.
///
/// While running, arriving notifications are stamped and pushed into a
/// bounded queue that the notification pipeline drains in order, so a slow
/// store write never holds up receipt of the next notification.
use bluer::Address;
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::future::Future;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

use crate::bluetooth::identity::read_identity;
use crate::bluetooth::transport::{NotificationStream, Peripheral, Transport};
use crate::bluetooth::uuids;
use crate::clock::Clock;
use crate::database::RecordSink;
use crate::error::SessionError;
use crate::models::{Notification, PeripheralIdentity};
use crate::pipeline::NotificationPipeline;
use crate::utils::format_datetime;

const NOTIFICATION_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Discovering,
    Connected,
    IdentityRead,
    Subscribed,
    Running,
    Closed,
    Failed,
}

/// Result of a session that ended by cancellation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// `None` when cancelled before the identification reads finished
    pub identity: Option<PeripheralIdentity>,
}

enum Ending {
    Cancelled,
    LinkLost,
}

pub struct ConnectionSession {
    address: Address,
    state: SessionState,
}

impl ConnectionSession {
    pub fn new(address: Address) -> Self {
        ConnectionSession {
            address,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to a terminal state.
    ///
    /// Returns `Ok` when `shutdown` flips to `true`, at any phase.
    pub async fn run<T, S, C>(
        &mut self,
        transport: &T,
        pipeline: &mut NotificationPipeline<'_, S>,
        clock: &C,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionReport, SessionError>
    where
        T: Transport,
        S: RecordSink,
        C: Clock,
    {
        let result = self.drive(transport, pipeline, clock, shutdown).await;
        match &result {
            Ok(_) => self.transition(SessionState::Closed),
            Err(_) => self.transition(SessionState::Failed),
        }
        result
    }

    async fn drive<T, S, C>(
        &mut self,
        transport: &T,
        pipeline: &mut NotificationPipeline<'_, S>,
        clock: &C,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionReport, SessionError>
    where
        T: Transport,
        S: RecordSink,
        C: Clock,
    {
        self.transition(SessionState::Discovering);
        info!("Searching for device {}", self.address);

        let discovered = match until_cancelled(shutdown, transport.discover(self.address)).await {
            Some(discovered) => discovered.map_err(SessionError::AdapterUnavailable)?,
            None => return Ok(SessionReport::default()),
        };
        let peripheral = discovered.ok_or(SessionError::DeviceNotFound {
            address: self.address,
        })?;

        let result = match until_cancelled(shutdown, peripheral.connect()).await {
            None => Ok(SessionReport::default()),
            Some(Err(source)) => Err(SessionError::ConnectFailed {
                address: self.address,
                source,
            }),
            Some(Ok(())) => {
                self.transition(SessionState::Connected);
                info!("Connected to {}", self.address);
                self.serve(&peripheral, pipeline, clock, shutdown).await
            }
        };

        if let Err(e) = peripheral.disconnect().await {
            debug!("Disconnect from {} failed: {}", self.address, e);
        } else {
            info!("Disconnected from {}", self.address);
        }
        result
    }

    async fn serve<P, S, C>(
        &mut self,
        peripheral: &P,
        pipeline: &mut NotificationPipeline<'_, S>,
        clock: &C,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionReport, SessionError>
    where
        P: Peripheral,
        S: RecordSink,
        C: Clock,
    {
        let identity = match until_cancelled(shutdown, read_identity(peripheral)).await {
            Some(identity) => identity?,
            None => return Ok(SessionReport::default()),
        };
        self.transition(SessionState::IdentityRead);
        for line in identity.display_lines() {
            info!("{}", line);
        }

        let notifications = match until_cancelled(shutdown, subscribe(peripheral)).await {
            Some(notifications) => notifications?,
            None => {
                return Ok(SessionReport {
                    identity: Some(identity),
                })
            }
        };
        self.transition(SessionState::Subscribed);

        self.transition(SessionState::Running);
        info!("Receiving measurements from {}", self.address);
        match pump(notifications, pipeline, clock, shutdown).await {
            Ending::Cancelled => Ok(SessionReport {
                identity: Some(identity),
            }),
            Ending::LinkLost => Err(SessionError::LinkLost {
                address: self.address,
            }),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {:?} -> {:?}", self.address, self.state, next);
        self.state = next;
    }
}

/// Turn on the humidity sensor and start notifications on its data characteristic
async fn subscribe<P: Peripheral>(peripheral: &P) -> Result<NotificationStream, SessionError> {
    peripheral
        .write(uuids::HUMIDITY_CONFIG, &uuids::HUMIDITY_ENABLE)
        .await
        .map_err(|source| SessionError::SubscriptionFailed {
            step: "enable measurements",
            uuid: uuids::HUMIDITY_CONFIG,
            source,
        })?;

    peripheral
        .subscribe(uuids::HUMIDITY_DATA)
        .await
        .map_err(|source| SessionError::SubscriptionFailed {
            step: "enable notifications",
            uuid: uuids::HUMIDITY_DATA,
            source,
        })
}

/// Feed notifications into the pipeline until cancelled or the stream ends.
///
/// After link loss the pipeline drains whatever is still queued. After
/// cancellation it only finishes the write in progress.
async fn pump<S, C>(
    mut notifications: NotificationStream,
    pipeline: &mut NotificationPipeline<'_, S>,
    clock: &C,
    shutdown: &mut watch::Receiver<bool>,
) -> Ending
where
    S: RecordSink,
    C: Clock,
{
    let (queue, backlog) = mpsc::channel(NOTIFICATION_QUEUE_CAPACITY);
    let (cancel, cancelled) = watch::channel(false);

    let receive = async move {
        let ending = loop {
            tokio::select! {
                biased;
                Ok(_) = shutdown.wait_for(|stop| *stop) => {
                    info!("Shutdown requested, stopping notifications");
                    let _ = cancel.send(true);
                    break Ending::Cancelled;
                }
                next = notifications.next() => match next {
                    Some(payload) => {
                        let notification = Notification {
                            payload,
                            received_at: clock.now(),
                        };
                        if let Err(TrySendError::Full(dropped)) = queue.try_send(notification) {
                            warn!(
                                "Notification queue full, dropping reading received at {}",
                                format_datetime(&dropped.received_at)
                            );
                        }
                    }
                    None => {
                        warn!("Notification stream ended");
                        break Ending::LinkLost;
                    }
                }
            }
        };
        // closing the queue lets the pipeline finish
        drop(queue);
        drop(notifications);
        ending
    };

    let (ending, ()) = tokio::join!(receive, pipeline.run(backlog, cancelled));
    ending
}

async fn until_cancelled<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    future: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        Ok(_) = shutdown.wait_for(|stop| *stop) => None,
        output = future => Some(output),
    }
}
