//! Per-connection session with one OpenFlow switch.
//!
//! ```text
//! Connected → VersionNegotiated → FeaturesRequested → Established
//!     ↓               ↓                   ↓                ↓
//!     └───────────────┴───────── Closing ─┴────────────────┘
//!                                   ↓
//!                                 Closed
//! ```

use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::{OfpError, Result};
use crate::ofp_codec::OfpCodec;
use crate::ofp_header::Envelope;
use crate::ofp_message::{DeviceIdentity, Message, OfpMessage};
use crate::ofp_protocol::{negotiate, Protocol};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Transport up, waiting for the peer HELLO.
    #[default]
    Connected,
    /// Version agreed, our HELLO is going out.
    VersionNegotiated,
    /// FEATURES_REQUEST sent, waiting for the reply.
    FeaturesRequested,
    /// Identity known; messages flow to the consumer.
    Established,
    Closing,
    Closed,
}

impl DeviceState {
    pub fn can_transition_to(&self, next: DeviceState) -> bool {
        use DeviceState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closing) => true,
            (Connected, VersionNegotiated) => true,
            (VersionNegotiated, FeaturesRequested) => true,
            (FeaturesRequested, Established) => true,
            (Closing, Closed) => true,
            _ => false,
        }
    }

    pub fn transition_to(&mut self, next: DeviceState) -> Result<()> {
        if self.can_transition_to(next) {
            *self = next;
            Ok(())
        } else {
            Err(OfpError::InvalidStateTransition {
                from: *self,
                to: next,
            })
        }
    }

    #[inline]
    pub fn is_established(&self) -> bool {
        matches!(self, DeviceState::Established)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, DeviceState::Closed)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on HELLO through FEATURES_REPLY.
    pub handshake_timeout: Duration,
    /// Upper bound on flushing the transport while closing.
    pub close_timeout: Duration,
    /// Depth of the outbound command queue.
    pub command_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(1),
            command_queue: 64,
        }
    }
}

/// Transaction ids for controller-initiated messages.
#[derive(Debug)]
pub struct XidGenerator {
    next: u32,
}

impl Default for XidGenerator {
    fn default() -> XidGenerator {
        XidGenerator { next: 1 }
    }
}

impl XidGenerator {
    pub fn next_xid(&mut self) -> u32 {
        let xid = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        xid
    }
}

/// What a session reports to the consumer.
#[derive(Debug)]
pub enum DeviceEvent {
    /// Handshake finished.
    Connected {
        session: u64,
        version: u8,
        identity: DeviceIdentity,
        handle: DeviceHandle,
    },
    /// A message from an established switch, in receive order.
    Message {
        session: u64,
        xid: u32,
        message: Message,
    },
    /// An established session ended.
    Disconnected {
        session: u64,
        datapath_id: u64,
        reason: String,
    },
}

impl DeviceEvent {
    pub fn session(&self) -> u64 {
        match *self {
            DeviceEvent::Connected { session, .. } |
            DeviceEvent::Message { session, .. } |
            DeviceEvent::Disconnected { session, .. } => session,
        }
    }
}

/// Sends commands to an established session.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    session: u64,
    protocol: &'static dyn Protocol,
    commands: mpsc::Sender<Box<dyn OfpMessage>>,
}

impl DeviceHandle {
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Adapter of the negotiated version, for building commands.
    pub fn protocol(&self) -> &'static dyn Protocol {
        self.protocol
    }

    pub fn version(&self) -> u8 {
        self.protocol.version()
    }

    /// Queue a message for the switch. Messages of another version are dropped by the session.
    pub async fn send(&self, msg: Box<dyn OfpMessage>) -> Result<()> {
        self.commands.send(msg).await.map_err(|_| OfpError::SessionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// One switch connection, driven by `run` on its own task.
pub struct Device<T> {
    id: u64,
    framed: Framed<T, OfpCodec>,
    state: DeviceState,
    protocol: Option<&'static dyn Protocol>,
    identity: Option<DeviceIdentity>,
    xids: XidGenerator,
    events: mpsc::Sender<DeviceEvent>,
    commands: mpsc::Receiver<Box<dyn OfpMessage>>,
    command_tx: Option<mpsc::Sender<Box<dyn OfpMessage>>>,
    cancel: CancellationToken,
    config: SessionConfig,
}

impl<T> Device<T>
    where T: AsyncRead + AsyncWrite + Unpin + Send
{
    pub fn new(id: u64,
               conn: T,
               events: mpsc::Sender<DeviceEvent>,
               cancel: CancellationToken,
               config: SessionConfig)
               -> Device<T> {
        let (command_tx, commands) = mpsc::channel(config.command_queue.max(1));
        Device {
            id,
            framed: Framed::new(conn, OfpCodec),
            state: DeviceState::default(),
            protocol: None,
            identity: None,
            xids: XidGenerator::default(),
            events,
            commands,
            command_tx: Some(command_tx),
            cancel,
            config,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Negotiated adapter; `None` before the peer HELLO.
    pub fn protocol(&self) -> Option<&'static dyn Protocol> {
        self.protocol
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Drive the session until the peer leaves, an error occurs or the token fires.
    ///
    /// The session is always closed on return. `Ok` means an orderly end
    /// (peer EOF or cancellation).
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        self.close(&result).await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        let (protocol, identity) = match self.handshake().await? {
            Some(established) => established,
            None => return Ok(()),
        };
        tracing::Span::current().record("dpid", format!("{:016x}", identity.datapath_id).as_str());
        tracing::info!(version = protocol.name(),
                       ports = identity.ports.len(),
                       tables = identity.num_tables,
                       "device established");
        self.identity = Some(identity.clone());

        let handle = DeviceHandle {
            session: self.id,
            protocol,
            commands: self.command_tx.take().ok_or(OfpError::SessionClosed)?,
        };
        self.emit(DeviceEvent::Connected {
                session: self.id,
                version: protocol.version(),
                identity,
                handle,
            })
            .await?;
        self.established(protocol).await
    }

    /// HELLO exchange and features request, bounded by the handshake timeout.
    async fn handshake(&mut self) -> Result<Option<(&'static dyn Protocol, DeviceIdentity)>> {
        let cancel = self.cancel.clone();
        let limit = self.config.handshake_timeout;
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            res = tokio::time::timeout(limit, self.exchange()) => match res {
                Ok(r) => r,
                Err(_) => Err(OfpError::HandshakeTimeout),
            },
        }
    }

    async fn exchange(&mut self) -> Result<Option<(&'static dyn Protocol, DeviceIdentity)>> {
        let hello = match self.framed.next().await {
            Some(frame) => frame?,
            None => return Ok(None),
        };
        let protocol = negotiate(&hello)?;
        self.state.transition_to(DeviceState::VersionNegotiated)?;
        self.protocol = Some(protocol);
        tracing::debug!(peer_version = hello.version(),
                        version = protocol.name(),
                        "version negotiated");

        let xid = self.xids.next_xid();
        self.send(protocol.hello(xid)).await?;
        let xid = self.xids.next_xid();
        self.send(protocol.features_request(xid)).await?;
        self.state.transition_to(DeviceState::FeaturesRequested)?;

        loop {
            let env = match self.framed.next().await {
                Some(frame) => frame?,
                None => return Ok(None),
            };
            check_version(protocol, &env)?;
            match protocol.decode(&env)? {
                Message::FeaturesReply(identity) => {
                    self.state.transition_to(DeviceState::Established)?;
                    return Ok(Some((protocol, identity)));
                }
                Message::EchoRequest(data) => {
                    self.send(protocol.echo_reply(env.xid(), data)).await?;
                }
                Message::Hello => tracing::debug!("duplicate hello ignored"),
                Message::Error(e) => {
                    return Err(OfpError::ProtocolViolation(format!(
                        "switch error type {} code {} during handshake",
                        e.typ, e.code
                    )));
                }
                other => {
                    return Err(OfpError::ProtocolViolation(format!(
                        "{} before features reply",
                        other.kind()
                    )));
                }
            }
        }
    }

    async fn established(&mut self, protocol: &'static dyn Protocol) -> Result<()> {
        let cancel = self.cancel.clone();
        let mut commands_open = true;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                frame = self.framed.next() => {
                    let env = match frame {
                        Some(frame) => frame?,
                        None => return Ok(()),
                    };
                    self.dispatch(protocol, env).await?;
                }
                cmd = self.commands.recv(), if commands_open => match cmd {
                    Some(msg) => self.command(protocol, msg).await?,
                    None => commands_open = false,
                },
            }
        }
    }

    async fn dispatch(&mut self, protocol: &'static dyn Protocol, env: Envelope) -> Result<()> {
        check_version(protocol, &env)?;
        let xid = env.xid();
        match protocol.decode(&env)? {
            Message::EchoRequest(data) => self.send(protocol.echo_reply(xid, data)).await,
            message => {
                tracing::trace!(xid, kind = message.kind(), "message");
                self.emit(DeviceEvent::Message {
                        session: self.id,
                        xid,
                        message,
                    })
                    .await
            }
        }
    }

    async fn command(&mut self, protocol: &'static dyn Protocol, msg: Box<dyn OfpMessage>) -> Result<()> {
        let env = match msg.to_envelope() {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "dropping command that failed to encode");
                return Ok(());
            }
        };
        if env.version() != protocol.version() {
            tracing::warn!(expected = protocol.version(),
                           got = env.version(),
                           "dropping command of the wrong version");
            return Ok(());
        }
        self.write(env).await
    }

    async fn send(&mut self, msg: Box<dyn OfpMessage>) -> Result<()> {
        let env = msg.to_envelope()?;
        self.write(env).await
    }

    /// Write one frame, abandoning it if the session is cancelled while the peer
    /// is not reading. The caller's loop then sees the token and closes.
    async fn write(&mut self, env: Envelope) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(()),
            sent = self.framed.send(env) => sent,
        }
    }

    /// Deliver an event, giving up if the session is cancelled meanwhile.
    async fn emit(&mut self, event: DeviceEvent) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(()),
            sent = self.events.send(event) => sent.map_err(|_| OfpError::ConsumerClosed),
        }
    }

    async fn close(&mut self, result: &Result<()>) {
        if self.state.is_closed() {
            return;
        }
        if self.state != DeviceState::Closing {
            // every live state may close
            if let Err(e) = self.state.transition_to(DeviceState::Closing) {
                tracing::debug!(error = %e, "close from unexpected state");
            }
        }
        match result {
            Ok(()) => tracing::info!("device closed"),
            Err(e) => tracing::warn!(error = %e, "device closed"),
        }

        let limit = self.config.close_timeout;
        if tokio::time::timeout(limit, SinkExt::<Envelope>::close(&mut self.framed)).await.is_err() {
            tracing::debug!("transport close timed out");
        }

        if let Some(identity) = self.identity.take() {
            let reason = match result {
                Ok(()) => "closed".to_string(),
                Err(e) => e.to_string(),
            };
            let event = DeviceEvent::Disconnected {
                session: self.id,
                datapath_id: identity.datapath_id,
                reason,
            };
            if tokio::time::timeout(limit, self.events.send(event)).await.is_err() {
                tracing::debug!("disconnect event not delivered");
            }
        }
        if let Err(e) = self.state.transition_to(DeviceState::Closed) {
            tracing::debug!(error = %e, "close from unexpected state");
        }
    }
}

fn check_version(protocol: &dyn Protocol, env: &Envelope) -> Result<()> {
    if env.version() != protocol.version() {
        return Err(OfpError::VersionMismatch {
            expected: protocol.version(),
            got: env.version(),
        });
    }
    Ok(())
}
