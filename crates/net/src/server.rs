//! Session coordinator: accept loop, registration, registry, fanout
//!
//! The coordinator owns the listening socket and the connection registry.
//! Registration is a multi-round-trip exchange (Join, ConnectAck, Ready)
//! bounded by a counting semaphore so connection bursts cannot race the
//! registry into partial or duplicate seats; a seat is reserved for the
//! whole exchange and committed only when the final echo checks out.
//!
//! Game decisions never touch the registry: each connection's receive loop
//! resolves them through the shared [`DecisionBook`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use turncoat_core::{GameConfig, Participant, ParticipantId};

use crate::decision::{Decision, DecisionBook, Resolution};
use crate::error::{Error, Result};
use crate::frame::{read_message, write_frame};
use crate::protocol::Message;

/// Time a connection gets to complete each registration step
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound queue depth per connection
const PEER_QUEUE: usize = 64;

/// A committed participant's connection
struct PeerHandle {
    name: String,
    tx: mpsc::Sender<Message>,
}

/// Registry of committed peers plus seats held by in-flight handshakes
///
/// Mutated only under its lock. A reservation either becomes a peer or
/// vanishes; a failed handshake never leaves a trace.
#[derive(Default)]
struct RegistryState {
    peers: HashMap<ParticipantId, PeerHandle>,
    reservations: HashMap<ParticipantId, String>,
}

impl RegistryState {
    fn lowest_free_seat(&self, seats: u8) -> Option<ParticipantId> {
        (1..=seats)
            .map(ParticipantId)
            .find(|id| !self.peers.contains_key(id) && !self.reservations.contains_key(id))
    }

    fn name_taken(&self, name: &str) -> bool {
        self.peers.values().any(|p| p.name == name)
            || self.reservations.values().any(|n| n == name)
    }
}

struct CoordinatorInner {
    config: GameConfig,
    registry: RwLock<RegistryState>,
    decisions: DecisionBook,
    handshake_permits: Arc<Semaphore>,
    /// Publishes the committed-peer count; the driver waits on it
    roster_tx: watch::Sender<usize>,
    /// Set once the roster is sealed; later connections are refused
    started: AtomicBool,
}

/// Coordinator handle
pub struct Coordinator {
    addr: SocketAddr,
    inner: Arc<CoordinatorInner>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Coordinator {
    /// Bind the listen port and start accepting connections
    pub async fn start(config: GameConfig) -> Result<Self> {
        config.validate()?;

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            port: config.port,
            source,
        })?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Coordinator listening");

        let (shutdown_tx, _) = broadcast::channel(1);
        let (roster_tx, _) = watch::channel(0usize);

        let inner = Arc::new(CoordinatorInner {
            handshake_permits: Arc::new(Semaphore::new(config.handshake_permits)),
            config,
            registry: RwLock::new(RegistryState::default()),
            decisions: DecisionBook::new(),
            roster_tx,
            started: AtomicBool::new(false),
        });

        tokio::spawn(accept_loop(
            listener,
            inner.clone(),
            shutdown_tx.subscribe(),
        ));

        Ok(Coordinator {
            addr: bound_addr,
            inner,
            shutdown_tx,
        })
    }

    /// Get the coordinator's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &GameConfig {
        &self.inner.config
    }

    /// The decision slots shared with every receive loop
    pub fn decisions(&self) -> &DecisionBook {
        &self.inner.decisions
    }

    /// Number of committed participants
    pub async fn registered(&self) -> usize {
        self.inner.registry.read().await.peers.len()
    }

    /// Seats with a live connection right now
    pub async fn connected_seats(&self) -> Vec<ParticipantId> {
        let registry = self.inner.registry.read().await;
        let mut seats: Vec<_> = registry.peers.keys().copied().collect();
        seats.sort();
        seats
    }

    /// Wait until every seat is taken, then seal registration
    ///
    /// Returns the roster in seat order. Once sealed, later connection
    /// attempts are refused; the game is underway.
    pub async fn await_full_roster(&self) -> Result<Vec<Participant>> {
        let seats = self.inner.config.participants as usize;
        let mut roster_rx = self.inner.roster_tx.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *roster_rx.borrow_and_update() >= seats {
                let registry = self.inner.registry.read().await;
                // A seat may have dropped between the notification and now
                if registry.peers.len() == seats {
                    let mut roster: Vec<Participant> = registry
                        .peers
                        .iter()
                        .map(|(id, peer)| Participant::new(*id, peer.name.clone()))
                        .collect();
                    roster.sort_by_key(|p| p.id);
                    drop(registry);

                    self.inner.started.store(true, Ordering::SeqCst);
                    info!(participants = roster.len(), "Roster complete, registration sealed");
                    return Ok(roster);
                }
            }

            tokio::select! {
                changed = roster_rx.changed() => {
                    if changed.is_err() {
                        return Err(Error::ConnectionClosed);
                    }
                }
                _ = shutdown_rx.recv() => return Err(Error::ConnectionClosed),
            }
        }
    }

    /// Queue a message for every connected participant
    pub async fn broadcast(&self, msg: Message) {
        broadcast_from(&self.inner, msg).await;
    }

    /// Queue a message for one participant; absent seats are skipped
    pub async fn unicast(&self, seat: ParticipantId, msg: Message) {
        send_to(&self.inner, seat, msg).await;
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Coordinator shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    inner: Arc<CoordinatorInner>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        let inner = inner.clone();
                        tokio::spawn(handle_connection(stream, addr, inner));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single connection from registration to disconnect
async fn handle_connection(stream: TcpStream, addr: SocketAddr, inner: Arc<CoordinatorInner>) {
    // Registration is multi-round-trip; bound how many run at once
    let permit = match inner.handshake_permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };

    let (mut reader, mut writer) = tokio::io::split(stream);

    let (seat, name) = match handshake(&mut reader, &mut writer, &inner).await {
        Ok(registered) => registered,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Handshake failed");
            // Polite refusals carry a reason before the connection drops
            let reason = match &e {
                Error::Rejected(reason) => Some(reason.clone()),
                Error::SessionFull => Some("Session is full".to_string()),
                _ => None,
            };
            if let Some(reason) = reason {
                let _ = write_frame(&mut writer, &Message::ProtocolError { reason }).await;
            }
            return;
        }
    };
    drop(permit);

    // Commit: reservation becomes a registered peer with a writer task
    let (msg_tx, msg_rx) = mpsc::channel(PEER_QUEUE);
    let count = {
        let mut registry = inner.registry.write().await;
        registry.reservations.remove(&seat);
        registry.peers.insert(seat, PeerHandle { name, tx: msg_tx });
        registry.peers.len()
    };
    inner.roster_tx.send_replace(count);

    let writer_handle = tokio::spawn(writer_task(writer, msg_rx));

    info!(addr = %addr, participant = %seat, "Participant registered");

    receive_loop(&mut reader, seat, &inner).await;

    // Cleanup
    writer_handle.abort();
    remove_participant(&inner, seat).await;
}

/// The registration exchange: Join in, ConnectAck out, Ready echo in
///
/// On success the seat is still only reserved; the caller commits it.
/// On failure nothing is left behind.
async fn handshake(
    reader: &mut ReadHalf<TcpStream>,
    writer: &mut WriteHalf<TcpStream>,
    inner: &Arc<CoordinatorInner>,
) -> Result<(ParticipantId, String)> {
    let name = match timed_read(reader).await? {
        Message::Join { name } => name.trim().to_string(),
        other => {
            return Err(Error::HandshakeFailed(format!(
                "Expected Join, got {other:?}"
            )))
        }
    };
    if name.is_empty() {
        return Err(Error::Rejected("A name is required".into()));
    }

    let seat = reserve_seat(inner, &name).await?;

    match confirm_seat(reader, writer, seat).await {
        Ok(()) => Ok((seat, name)),
        Err(e) => {
            release_reservation(inner, seat).await;
            Err(e)
        }
    }
}

/// Reserve the lowest free seat under the registry lock
async fn reserve_seat(inner: &Arc<CoordinatorInner>, name: &str) -> Result<ParticipantId> {
    if inner.started.load(Ordering::SeqCst) {
        return Err(Error::Rejected("Game already in progress".into()));
    }

    let mut registry = inner.registry.write().await;
    if registry.name_taken(name) {
        return Err(Error::Rejected(format!("Name '{name}' is taken")));
    }
    let Some(seat) = registry.lowest_free_seat(inner.config.participants) else {
        return Err(Error::SessionFull);
    };
    registry.reservations.insert(seat, name.to_string());
    Ok(seat)
}

/// Offer the seat and wait for the matching echo
async fn confirm_seat(
    reader: &mut ReadHalf<TcpStream>,
    writer: &mut WriteHalf<TcpStream>,
    seat: ParticipantId,
) -> Result<()> {
    write_frame(writer, &Message::ConnectAck { participant_id: seat }).await?;

    match timed_read(reader).await? {
        Message::Ready { participant_id } if participant_id == seat => Ok(()),
        Message::Ready { participant_id } => Err(Error::HandshakeFailed(format!(
            "Ready echoed {participant_id}, expected {seat}"
        ))),
        other => Err(Error::HandshakeFailed(format!(
            "Expected Ready, got {other:?}"
        ))),
    }
}

async fn release_reservation(inner: &Arc<CoordinatorInner>, seat: ParticipantId) {
    inner.registry.write().await.reservations.remove(&seat);
}

/// Read one message with the handshake deadline applied
async fn timed_read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_message(reader)).await {
        Ok(result) => result,
        Err(_) => Err(Error::HandshakeFailed("Registration step timed out".into())),
    }
}

/// Writer task - serializes all sends on one connection
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Read messages from one participant until the connection ends
///
/// Frame-level violations end the connection; well-framed junk gets a
/// `ProtocolError` reply and the connection lives on.
async fn receive_loop(
    reader: &mut ReadHalf<TcpStream>,
    seat: ParticipantId,
    inner: &Arc<CoordinatorInner>,
) {
    loop {
        match read_message(reader).await {
            Ok(Message::Disconnect { .. }) => {
                debug!(participant = %seat, "Graceful leave");
                break;
            }
            Ok(msg) => handle_participant_message(msg, seat, inner).await,
            Err(Error::Protocol(reason)) => {
                warn!(participant = %seat, reason = %reason, "Dropping unrecognized message");
                send_to(inner, seat, Message::ProtocolError { reason }).await;
            }
            Err(Error::ConnectionClosed) => {
                debug!(participant = %seat, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(participant = %seat, error = %e, "Read error");
                break;
            }
        }
    }
}

/// Route one in-game message from a participant
async fn handle_participant_message(
    msg: Message,
    seat: ParticipantId,
    inner: &Arc<CoordinatorInner>,
) {
    let decision = match msg {
        Message::TeamSelectionResponse { members } => Decision::Team(members),
        Message::VoteResponse { approve } => Decision::Vote(approve),
        Message::SabotageResponse { sabotage } => Decision::Sabotage(sabotage),
        other => {
            debug!(participant = %seat, msg = ?other, "Message outside its valid phase");
            send_to(
                inner,
                seat,
                Message::ProtocolError {
                    reason: "Message not valid right now".into(),
                },
            )
            .await;
            return;
        }
    };

    match inner.decisions.resolve(seat, decision) {
        Resolution::Accepted => {}
        Resolution::Stale { reason } => {
            debug!(participant = %seat, reason = %reason, "Stale decision response");
            send_to(inner, seat, Message::ProtocolError { reason }).await;
        }
    }
}

/// Drop a participant from the registry and tell everyone else
async fn remove_participant(inner: &Arc<CoordinatorInner>, seat: ParticipantId) {
    let count = {
        let mut registry = inner.registry.write().await;
        registry.peers.remove(&seat);
        registry.peers.len()
    };
    inner.roster_tx.send_replace(count);

    // Whoever awaits this seat's decision falls back immediately
    inner.decisions.cancel(seat);

    broadcast_from(inner, Message::Disconnect { participant_id: seat }).await;
    info!(participant = %seat, "Participant disconnected");
}

/// Broadcast to all committed peers
///
/// Handles are copied under the lock and sends happen after it is
/// released; the registry lock is never held across a channel send.
async fn broadcast_from(inner: &Arc<CoordinatorInner>, msg: Message) {
    let handles: Vec<(ParticipantId, mpsc::Sender<Message>)> = {
        let registry = inner.registry.read().await;
        registry
            .peers
            .iter()
            .map(|(id, peer)| (*id, peer.tx.clone()))
            .collect()
    };

    for (seat, tx) in handles {
        if tx.send(msg.clone()).await.is_err() {
            debug!(participant = %seat, "Writer gone, skipping broadcast");
        }
    }
}

/// Send to a single peer; absent seats are skipped silently
async fn send_to(inner: &Arc<CoordinatorInner>, seat: ParticipantId, msg: Message) {
    let tx = {
        let registry = inner.registry.read().await;
        registry.peers.get(&seat).map(|peer| peer.tx.clone())
    };

    if let Some(tx) = tx {
        if tx.send(msg).await.is_err() {
            debug!(participant = %seat, "Writer gone, dropping message");
        }
    }
}
