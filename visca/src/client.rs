//! Client handle to a running engine

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;
use visca_core::{Action, Address, Inquiry, InquiryValue};
use visca_transport::Transport;
use visca_types::{CameraState, ConnectionState, Speeds};

use crate::camera::Camera;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::dispatcher::{CommandId, DispatchConfig, Dispatcher};
use crate::engine::{Engine, Request};
use crate::error::{Error, Result};
use crate::event::{EventReceiver, EventSender, event_channel};
use crate::state::{Snapshot, StateStore};

/// Handle to a VISCA engine
///
/// Cheap to clone. Every operation posts a request to the engine task and
/// waits for its answer; nothing here touches the link directly. The engine
/// stops when `shutdown` is called or the last client is dropped.
///
/// # Examples
///
/// ```no_run
/// use visca::{Action, Address, Client, Config, PanTiltDirection};
///
/// #[tokio::main]
/// async fn main() -> visca::Result<()> {
///     let client = Client::spawn(Config::new("/dev/ttyUSB0"))?;
///     client.connect().await?;
///
///     let handle = client
///         .issue(
///             Address::DEFAULT,
///             Action::PanTilt {
///                 direction: PanTiltDirection::Right,
///                 pan_speed: 10,
///                 tilt_speed: 10,
///             },
///         )
///         .await?;
///     handle.wait().await?;
///
///     client.shutdown().await
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    requests: mpsc::Sender<Request>,
    events: EventSender,
    state: watch::Receiver<Snapshot>,
    connection: watch::Receiver<ConnectionState>,
    next_id: Arc<AtomicU64>,
}

/// Pending result of an issued command
#[derive(Debug)]
pub struct CommandHandle {
    id: CommandId,
    rx: oneshot::Receiver<Result<()>>,
}

impl CommandHandle {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Wait for the camera to complete the command
    pub async fn wait(self) -> Result<()> {
        self.rx.await.unwrap_or(Err(Error::Shutdown))
    }
}

impl Client {
    /// Start an engine for the link `config.connection` names
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the connection
    /// string cannot be parsed. Link failures are reported later through
    /// status events.
    pub fn spawn(config: Config) -> Result<Self> {
        config.validate()?;
        let transport =
            visca_transport::from_connection_string(&config.connection, config.net_mode, &config.link)?;
        Self::with_transport(transport, config)
    }

    /// Start an engine on a caller-supplied transport
    pub fn with_transport(transport: Box<dyn Transport>, config: Config) -> Result<Self> {
        config.validate()?;

        let (events, _) = event_channel(config.event_capacity);
        let store = StateStore::new(
            &config.cameras,
            config.speeds,
            config.optimistic_state,
            events.clone(),
        );
        let state = store.subscribe();
        let manager = ConnectionManager::new(transport, &config, events.clone());
        let connection = manager.subscribe();
        let dispatcher = Dispatcher::new(DispatchConfig::from(&config), store);

        let (tx, rx) = mpsc::channel(config.request_capacity);
        let engine = Engine::new(manager, dispatcher, rx, events.clone(), &config);
        tokio::spawn(engine.run());

        Ok(Self {
            requests: tx,
            events,
            state,
            connection,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn post(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| Error::Shutdown)
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T>>) -> Request,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.post(request(tx)).await?;
        rx.await.unwrap_or(Err(Error::Shutdown))
    }

    /// Queue a command for `address`
    ///
    /// The returned handle resolves once the camera completes the command.
    ///
    /// # Errors
    ///
    /// Parameter errors are returned here, before anything is queued.
    pub async fn issue(&self, address: Address, action: Action) -> Result<CommandHandle> {
        if address.is_broadcast() {
            return Err(Error::Core(visca_core::Error::InvalidAddress(address.get())));
        }
        let frame = action.encode(address)?.to_bytes();
        let id = CommandId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();

        debug!(%address, %id, %action, "issue");
        self.post(Request::Issue {
            id,
            address,
            action,
            frame,
            respond: tx,
        })
        .await?;
        Ok(CommandHandle { id, rx })
    }

    /// Issue a command and wait for it to complete
    pub async fn execute(&self, address: Address, action: Action) -> Result<()> {
        self.issue(address, action).await?.wait().await
    }

    /// Cancel a queued or running command
    pub async fn cancel(&self, id: CommandId) -> Result<()> {
        self.call(|respond| Request::Cancel { id, respond }).await
    }

    pub async fn query(&self, address: Address, inquiry: Inquiry) -> Result<InquiryValue> {
        if address.is_broadcast() {
            return Err(Error::Core(visca_core::Error::InvalidAddress(address.get())));
        }
        self.call(|respond| Request::Query {
            address,
            inquiry,
            respond,
        })
        .await
    }

    /// Change the operator speeds used by directional actions
    pub async fn set_speeds(&self, address: Address, speeds: Speeds) -> Result<()> {
        speeds.validate()?;
        self.call(|respond| Request::SetSpeeds {
            address,
            speeds,
            respond,
        })
        .await
    }

    /// Send an interface clear and drop the camera's queued work
    pub async fn clear_interface(&self, address: Address) -> Result<()> {
        self.call(|respond| Request::ClearInterface { address, respond })
            .await
    }

    /// Connect now, starting the reconnect backoff over
    pub async fn connect(&self) -> Result<()> {
        self.call(|respond| Request::Connect { respond }).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.call(|respond| Request::Disconnect { respond }).await
    }

    /// Stop the engine; every outstanding request fails with `Shutdown`
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.post(Request::Shutdown { respond: tx }).await.is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn camera_state(&self, address: Address) -> Option<CameraState> {
        self.state.borrow().get(&address).cloned()
    }

    /// Every camera's state
    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    /// Facade bound to one camera
    pub fn camera(&self, address: Address) -> Camera {
        Camera::new(self.clone(), address)
    }
}
