//! TCP client for joining a session coordinator
//!
//! `connect` runs the registration handshake inline so a returned
//! `Client` always holds a confirmed seat. After that a background task
//! owns the socket; coordinator traffic surfaces as `CoordinatorEvent`s
//! and responses go back through a command channel.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use turncoat_core::{MissionRecord, ParticipantId, Role, Snapshot, Winner};

use crate::error::{Error, Result};
use crate::frame::{read_message, write_frame};
use crate::protocol::Message;

/// Event received from the coordinator
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// This seat's secret role
    RoleAssigned(Role),
    /// Fresh public snapshot of the session
    StateUpdated(Snapshot),
    /// This seat leads and must pick a team
    TeamSelectionRequested {
        leader: ParticipantId,
        size: u8,
        deadline: Duration,
    },
    /// A proposal is on the table
    VoteRequested {
        proposal: Vec<ParticipantId>,
        deadline: Duration,
    },
    /// This seat is on the mission
    SabotageChoiceRequested { deadline: Duration },
    /// A mission resolved
    MissionOutcome { success: bool, sabotages: u8 },
    /// The game is over
    GameOver {
        winner: Winner,
        history: Vec<MissionRecord>,
    },
    /// Another seat dropped out
    PeerDisconnected(ParticipantId),
    /// Narration from the coordinator
    LogLine(String),
    /// The coordinator refused something we sent
    ProtocolError(String),
    /// Connection lost
    Disconnected,
}

/// Client handle for one seat at the table
pub struct Client {
    participant_id: ParticipantId,
    name: String,
    event_rx: mpsc::Receiver<CoordinatorEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

enum ClientCommand {
    Send(Message),
    Disconnect,
}

impl Client {
    /// Connect and register under `name`
    pub async fn connect(addr: SocketAddr, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        info!(addr = %addr, name = %name, "Connecting to coordinator");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(&mut writer, &Message::Join { name: name.clone() }).await?;

        let participant_id = match read_message(&mut reader).await? {
            Message::ConnectAck { participant_id } => participant_id,
            Message::ProtocolError { reason } => return Err(Error::Rejected(reason)),
            other => {
                return Err(Error::Protocol(format!(
                    "Expected a connection ack, got {other:?}"
                )))
            }
        };

        write_frame(&mut writer, &Message::Ready { participant_id }).await?;

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(reader, writer, event_tx, cmd_rx));

        info!(participant = %participant_id, "Seated at the table");
        Ok(Client {
            participant_id,
            name,
            event_rx,
            cmd_tx,
        })
    }

    /// Seat assigned by the coordinator
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the next coordinator event
    pub async fn next_event(&mut self) -> Option<CoordinatorEvent> {
        self.event_rx.recv().await
    }

    /// Answer a team selection request
    pub async fn send_team_selection(&self, members: Vec<ParticipantId>) -> Result<()> {
        self.send(Message::TeamSelectionResponse { members }).await
    }

    /// Answer a vote request
    pub async fn send_vote(&self, approve: bool) -> Result<()> {
        self.send(Message::VoteResponse { approve }).await
    }

    /// Answer a sabotage request
    pub async fn send_sabotage(&self, sabotage: bool) -> Result<()> {
        self.send(Message::SabotageResponse { sabotage }).await
    }

    /// Announce departure and close the connection
    pub async fn disconnect(&self) {
        let _ = self
            .cmd_tx
            .send(ClientCommand::Send(Message::Disconnect {
                participant_id: self.participant_id,
            }))
            .await;
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(message))
            .await
            .map_err(|_| Error::NotConnected)
    }
}

/// Main connection task
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    event_tx: mpsc::Sender<CoordinatorEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            result = read_message(&mut reader) => {
                match result {
                    Ok(message) => {
                        if let Some(event) = event_for(message) {
                            if event_tx.send(event).await.is_err() {
                                debug!("Event receiver dropped");
                                break;
                            }
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("Coordinator closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(message)) => {
                        if let Err(e) = write_frame(&mut writer, &message).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                }
            }
        }
    }

    let _ = event_tx.send(CoordinatorEvent::Disconnected).await;
    info!("Disconnected from coordinator");
}

fn event_for(message: Message) -> Option<CoordinatorEvent> {
    match message {
        Message::RoleAssign { role } => Some(CoordinatorEvent::RoleAssigned(role)),
        Message::GameStateUpdate { snapshot } => Some(CoordinatorEvent::StateUpdated(snapshot)),
        Message::RequestTeamSelection {
            leader,
            size,
            deadline_ms,
        } => Some(CoordinatorEvent::TeamSelectionRequested {
            leader,
            size,
            deadline: Duration::from_millis(deadline_ms),
        }),
        Message::RequestVote {
            proposal,
            deadline_ms,
        } => Some(CoordinatorEvent::VoteRequested {
            proposal,
            deadline: Duration::from_millis(deadline_ms),
        }),
        Message::RequestSabotageChoice { deadline_ms } => {
            Some(CoordinatorEvent::SabotageChoiceRequested {
                deadline: Duration::from_millis(deadline_ms),
            })
        }
        Message::MissionOutcome { success, sabotages } => {
            Some(CoordinatorEvent::MissionOutcome { success, sabotages })
        }
        Message::GameOver { winner, history } => {
            Some(CoordinatorEvent::GameOver { winner, history })
        }
        Message::Disconnect { participant_id } => {
            Some(CoordinatorEvent::PeerDisconnected(participant_id))
        }
        Message::LogLine { text } => Some(CoordinatorEvent::LogLine(text)),
        Message::ProtocolError { reason } => {
            warn!(reason = %reason, "Coordinator refused a message");
            Some(CoordinatorEvent::ProtocolError(reason))
        }
        other => {
            debug!(message = ?other, "Ignoring unexpected message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Coordinator;
    use turncoat_core::GameConfig;

    fn test_config() -> GameConfig {
        GameConfig {
            port: 0,
            ..GameConfig::default()
        }
    }

    #[tokio::test]
    async fn test_client_registers() {
        let coordinator = Coordinator::start(test_config()).await.unwrap();

        let client = Client::connect(coordinator.addr(), "alice").await.unwrap();
        assert_eq!(client.participant_id(), ParticipantId(1));
        assert_eq!(client.name(), "alice");

        client.disconnect().await;
        coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let coordinator = Coordinator::start(test_config()).await.unwrap();

        let _first = Client::connect(coordinator.addr(), "alice").await.unwrap();
        match Client::connect(coordinator.addr(), "alice").await {
            Err(Error::Rejected(reason)) => assert!(reason.contains("taken")),
            Err(other) => panic!("Expected a rejection, got {other:?}"),
            Ok(_) => panic!("Expected a rejection, got a seat"),
        }

        coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_peer_disconnect_is_surfaced() {
        let coordinator = Coordinator::start(test_config()).await.unwrap();

        let first = Client::connect(coordinator.addr(), "alice").await.unwrap();
        let mut second = Client::connect(coordinator.addr(), "bob").await.unwrap();

        first.disconnect().await;

        loop {
            match second.next_event().await {
                Some(CoordinatorEvent::PeerDisconnected(id)) => {
                    assert_eq!(id, first.participant_id());
                    break;
                }
                Some(_) => continue,
                None => panic!("Connection dropped before the peer notice arrived"),
            }
        }

        coordinator.shutdown();
    }
}
