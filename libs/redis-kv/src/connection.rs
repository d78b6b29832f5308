//! Connection manager
//!
//! Tracks the adapter's view of the connection as a single state machine.
//! Client events are drained from a broadcast receiver on every call
//! (`pump_events`), so no background task is needed and state only changes
//! in `apply_event` plus the connect/disconnect/destroy paths below.
//!
//! ```text
//! NotConnected -> Connecting -> Ready -> Ended -> Connecting ...
//!       \______________\__________\_______\____-> Destroyed (terminal)
//! ```

use crate::client::{ClientStatus, StoreClient, StoreEvent};
use crate::error::{AdapterError, Result};
use crate::observer::{AdapterEvent, AdapterObserver};
use crate::stats::StatisticsCounters;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

/// Readiness polling interval
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Readiness polling attempts before `ConnectionTimeout` (5 s ceiling)
pub const READY_POLL_ATTEMPTS: u32 = 50;

/// Adapter-side connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Ready,
    Ended,
    /// Terminal: every operation is rejected
    Destroyed,
}

impl From<ClientStatus> for ConnectionState {
    fn from(status: ClientStatus) -> Self {
        match status {
            ClientStatus::Wait => ConnectionState::NotConnected,
            ClientStatus::Connecting | ClientStatus::Connect | ClientStatus::Reconnecting => {
                ConnectionState::Connecting
            },
            ClientStatus::Ready => ConnectionState::Ready,
            ClientStatus::End => ConnectionState::Ended,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::NotConnected => "not_connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Ended => "ended",
            ConnectionState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Store client plus who is responsible for closing it
pub enum ClientHandle {
    /// Created by the adapter; the adapter closes it
    Owned(Arc<dyn StoreClient>),
    /// Supplied by the caller; the adapter never closes it
    Borrowed(Arc<dyn StoreClient>),
}

impl ClientHandle {
    pub fn client(&self) -> &Arc<dyn StoreClient> {
        match self {
            ClientHandle::Owned(client) | ClientHandle::Borrowed(client) => client,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, ClientHandle::Owned(_))
    }
}

enum ReadyAction {
    Connect,
    Poll,
}

pub struct ConnectionManager {
    handle: ClientHandle,
    /// None once destroyed
    events: Mutex<Option<broadcast::Receiver<StoreEvent>>>,
    state: Mutex<ConnectionState>,
    stats: StatisticsCounters,
    observer: Arc<dyn AdapterObserver>,
    connection_timeout: Duration,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("owned", &self.handle.is_owned())
            .field("state", &self.state())
            .field("client_status", &self.client().status())
            .finish()
    }
}

impl ConnectionManager {
    /// Adopt the handle's current status; nothing is dialed here
    pub fn new(
        handle: ClientHandle,
        observer: Arc<dyn AdapterObserver>,
        connection_timeout: Duration,
    ) -> Self {
        // Subscribe before sampling status so no transition falls in between
        let events = handle.client().subscribe();
        let state = ConnectionState::from(handle.client().status());

        Self {
            handle,
            events: Mutex::new(Some(events)),
            state: Mutex::new(state),
            stats: StatisticsCounters::default(),
            observer,
            connection_timeout,
        }
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        self.handle.client()
    }

    pub fn is_owned(&self) -> bool {
        self.handle.is_owned()
    }

    pub fn stats(&self) -> &StatisticsCounters {
        &self.stats
    }

    pub fn observer(&self) -> &Arc<dyn AdapterObserver> {
        &self.observer
    }

    pub fn set_observer(&mut self, observer: Arc<dyn AdapterObserver>) {
        self.observer = observer;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Change state unless destroyed
    fn transition(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Destroyed {
            *state = next;
        }
    }

    /// Drain pending client events into state, counters and the observer
    pub fn pump_events(&self) {
        let mut pending = Vec::new();
        let mut lagged = false;
        {
            let mut events = self.events.lock();
            let Some(rx) = events.as_mut() else {
                return;
            };
            loop {
                match rx.try_recv() {
                    Ok(event) => pending.push(event),
                    Err(TryRecvError::Lagged(missed)) => {
                        debug!("Missed {} store client events, resyncing status", missed);
                        lagged = true;
                    },
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }

        for event in pending {
            self.apply_event(event);
        }
        if lagged {
            self.transition(ConnectionState::from(self.client().status()));
        }
    }

    fn apply_event(&self, event: StoreEvent) {
        match event {
            StoreEvent::Connect => {
                let mut state = self.state.lock();
                if matches!(
                    *state,
                    ConnectionState::NotConnected | ConnectionState::Ended
                ) {
                    *state = ConnectionState::Connecting;
                }
                drop(state);
                self.observer.on_event(&AdapterEvent::Connected {
                    endpoint: self.client().endpoint(),
                });
            },
            StoreEvent::Ready => {
                self.transition(ConnectionState::Ready);
                self.observer.on_event(&AdapterEvent::Ready {
                    endpoint: self.client().endpoint(),
                });
            },
            StoreEvent::Error(message) => {
                // The client owns retry; state is left alone
                self.stats.record_error();
                self.observer.on_event(&AdapterEvent::Error { message });
            },
            StoreEvent::Reconnecting => {
                self.stats.record_reconnect();
                self.observer.on_event(&AdapterEvent::Reconnecting);
            },
            StoreEvent::End => {
                self.transition(ConnectionState::Ended);
                self.observer.on_event(&AdapterEvent::Ended);
            },
        }
    }

    /// Wait for readiness within the default polling budget
    pub async fn ensure_ready(&self) -> Result<()> {
        self.ready_within(READY_POLL_ATTEMPTS).await
    }

    /// Wait for readiness, polling at most `attempts` times
    ///
    /// Dials the client when it has never connected, or when the adapter
    /// owns it and it has ended. A supplied client that has ended is not
    /// reopened. Errors are reported against `connect`; callers re-attribute
    /// them to their own operation.
    pub async fn ready_within(&self, attempts: u32) -> Result<()> {
        self.pump_events();
        let client = self.client().clone();

        let action = {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Destroyed => return Err(AdapterError::destroyed("connect")),
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Connecting => ReadyAction::Poll,
                ConnectionState::NotConnected | ConnectionState::Ended => match client.status() {
                    ClientStatus::Ready => {
                        *state = ConnectionState::Ready;
                        return Ok(());
                    },
                    ClientStatus::End if !self.handle.is_owned() => {
                        return Err(AdapterError::connection(
                            "connect",
                            format!("supplied client for {} has ended", client.endpoint()),
                        ));
                    },
                    ClientStatus::Wait | ClientStatus::End => {
                        *state = ConnectionState::Connecting;
                        ReadyAction::Connect
                    },
                    ClientStatus::Connecting
                    | ClientStatus::Connect
                    | ClientStatus::Reconnecting => {
                        *state = ConnectionState::Connecting;
                        ReadyAction::Poll
                    },
                },
            }
        };

        if let ReadyAction::Connect = action {
            self.connect_client(client.as_ref()).await?;
        }

        for _ in 0..attempts {
            self.pump_events();
            match self.state() {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Destroyed => return Err(AdapterError::destroyed("connect")),
                // Another caller's dial failed underneath us
                ConnectionState::NotConnected | ConnectionState::Ended
                    if client.status() == ClientStatus::End =>
                {
                    return Err(AdapterError::connection(
                        "connect",
                        format!("connection to {} ended before becoming ready", client.endpoint()),
                    ));
                },
                _ => {},
            }
            if client.status() == ClientStatus::Ready {
                self.transition(ConnectionState::Ready);
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        self.pump_events();
        match self.state() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Destroyed => Err(AdapterError::destroyed("connect")),
            _ => Err(AdapterError::connection_timeout(
                "connect",
                format!(
                    "{} not ready after {} attempts at {:?}",
                    client.endpoint(),
                    attempts,
                    READY_POLL_INTERVAL
                ),
            )),
        }
    }

    async fn connect_client(&self, client: &dyn StoreClient) -> Result<()> {
        let endpoint = client.endpoint();
        self.observer.on_event(&AdapterEvent::Connecting {
            endpoint: endpoint.clone(),
        });

        match tokio::time::timeout(self.connection_timeout, client.connect()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.pump_events();
                self.transition(ConnectionState::NotConnected);
                Err(AdapterError::connection(
                    "connect",
                    format!("connect to {} failed: {}", endpoint, e),
                ))
            },
            Err(_) => {
                // The dial was dropped mid-flight; reset an owned client to
                // `End` so the next use dials again instead of polling it
                if self.handle.is_owned() {
                    if let Err(e) = client.disconnect().await {
                        warn!("RedisKvAdapter reset after connect timeout failed: {}", e);
                    }
                }
                self.pump_events();
                self.transition(ConnectionState::NotConnected);
                Err(AdapterError::connection_timeout(
                    "connect",
                    format!(
                        "connect to {} did not complete within {:?}",
                        endpoint, self.connection_timeout
                    ),
                ))
            },
        }
    }

    /// Close the transport if owned; the adapter stays usable
    pub async fn disconnect(&self) -> Result<()> {
        self.pump_events();
        if self.state() == ConnectionState::Destroyed {
            return Ok(());
        }

        if let ClientHandle::Owned(client) = &self.handle {
            client
                .disconnect()
                .await
                .map_err(|e| AdapterError::connection("disconnect", e.to_string()))?;
        }

        self.pump_events();
        self.transition(ConnectionState::Ended);
        self.observer.on_event(&AdapterEvent::Disconnected);
        Ok(())
    }

    /// Mark destroyed and, when owned, close the client. Idempotent.
    pub async fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Destroyed {
                return;
            }
            *state = ConnectionState::Destroyed;
        }
        // Stop listening to the client
        drop(self.events.lock().take());

        if let ClientHandle::Owned(client) = &self.handle {
            if let Err(e) = client.quit().await {
                self.observer.on_event(&AdapterEvent::ShutdownFallback {
                    error: e.to_string(),
                });
                if let Err(e) = client.disconnect().await {
                    warn!("RedisKvAdapter forced disconnect failed: {}", e);
                }
            }
        }

        self.observer.on_event(&AdapterEvent::Destroyed);
    }
}
