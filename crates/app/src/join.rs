//! Take a seat at a session
//!
//! Connects a participant, then pumps coordinator events into the
//! console presenter. Decision prompts run on the presenter thread; the
//! pump waits for the answer and sends it back. An answer that misses
//! the deadline still goes out and the coordinator drops it as stale.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use tracing::{info, warn};

use turncoat_net::{
    Client, CoordinatorEvent, Decision, DecisionRequest, Error, PresentationBridge, Result,
};

use crate::presenter;

const RETRY_DELAY: Duration = Duration::from_secs(5);
const RETRY_ATTEMPTS: u32 = 12;

pub async fn run(host: &str, port: u16, name: &str) -> Result<()> {
    let addr = resolve(host, port)?;
    let mut client = connect_with_retry(addr, name).await?;
    println!("Seated as {} ({})", client.name(), client.participant_id());

    let (bridge, console) = presenter::spawn_console();

    loop {
        tokio::select! {
            event = client.next_event() => {
                let Some(event) = event else { break };
                if handle_event(&client, &bridge, event).await? {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Leaving the table");
                client.disconnect().await;
                break;
            }
        }
    }

    drop(bridge);
    console.finish();
    Ok(())
}

/// Returns `true` once the session is over
async fn handle_event(
    client: &Client,
    bridge: &PresentationBridge,
    event: CoordinatorEvent,
) -> Result<bool> {
    match event {
        CoordinatorEvent::RoleAssigned(role) => bridge.role_assigned(role),
        CoordinatorEvent::StateUpdated(snapshot) => bridge.state_changed(snapshot),
        CoordinatorEvent::LogLine(text) => bridge.log_line(text),
        CoordinatorEvent::MissionOutcome { success, sabotages } => {
            bridge.mission_outcome(success, sabotages)
        }
        CoordinatorEvent::PeerDisconnected(id) => {
            bridge.log_line(format!("{id} left the table"));
        }
        CoordinatorEvent::ProtocolError(reason) => {
            bridge.log_line(format!("Coordinator refused that: {reason}"));
        }
        CoordinatorEvent::TeamSelectionRequested {
            leader,
            size,
            deadline,
        } => {
            let answer = bridge
                .request_decision(DecisionRequest::TeamSelection {
                    leader,
                    size,
                    deadline,
                })
                .await;
            if let Ok(Decision::Team(members)) = answer {
                client.send_team_selection(members).await?;
            }
        }
        CoordinatorEvent::VoteRequested { proposal, deadline } => {
            let answer = bridge
                .request_decision(DecisionRequest::Vote { proposal, deadline })
                .await;
            if let Ok(Decision::Vote(approve)) = answer {
                client.send_vote(approve).await?;
            }
        }
        CoordinatorEvent::SabotageChoiceRequested { deadline } => {
            let answer = bridge
                .request_decision(DecisionRequest::Sabotage { deadline })
                .await;
            if let Ok(Decision::Sabotage(sabotage)) = answer {
                client.send_sabotage(sabotage).await?;
            }
        }
        CoordinatorEvent::GameOver { winner, history } => {
            bridge.game_over(winner, history);
            return Ok(true);
        }
        CoordinatorEvent::Disconnected => {
            bridge.log_line("Connection to the coordinator lost");
            return Ok(true);
        }
    }
    Ok(false)
}

async fn connect_with_retry(addr: SocketAddr, name: &str) -> Result<Client> {
    let mut attempt = 0u32;
    loop {
        match Client::connect(addr, name).await {
            Ok(client) => return Ok(client),
            // A refused registration will not get better by retrying
            Err(Error::Rejected(reason)) => return Err(Error::Rejected(reason)),
            Err(e) => {
                attempt += 1;
                if attempt >= RETRY_ATTEMPTS {
                    return Err(e);
                }
                warn!(error = %e, attempt, "Connect failed, retrying");
                println!("No coordinator yet, retrying in {}s", RETRY_DELAY.as_secs());
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::HandshakeFailed(format!("no address for {host}:{port}")))
}
