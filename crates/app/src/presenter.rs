//! Console presentation
//!
//! A dedicated thread owns the terminal. Notices arrive over a std
//! channel, so rendering and prompting never race whatever is driving
//! the session; state is handed over by value and printed as-is.
//!
//! Decision prompts block this thread on stdin. The answer is fired
//! back through the notice's reply sender; if the table has already
//! moved on, the send fails and the answer is simply dropped.

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use turncoat_core::{MissionRecord, ParticipantId, Snapshot, Winner};
use turncoat_net::{Decision, DecisionRequest, Notice, PresentationBridge};

/// Handle to the presentation thread
pub struct ConsolePresenter {
    handle: JoinHandle<()>,
}

impl ConsolePresenter {
    /// Wait for the presenter to drain its queue and exit
    ///
    /// The thread ends once every bridge clone is gone, so call this
    /// after the driver or event pump has finished.
    pub fn finish(self) {
        let _ = self.handle.join();
    }
}

/// Spawn the console presenter and the bridge feeding it
pub fn spawn_console() -> (PresentationBridge, ConsolePresenter) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || present(rx));
    let bridge = PresentationBridge::new(move |notice| {
        let _ = tx.send(notice);
    });
    (bridge, ConsolePresenter { handle })
}

fn present(rx: mpsc::Receiver<Notice>) {
    for notice in rx {
        match notice {
            Notice::StateChanged(snapshot) => render_table(&snapshot),
            Notice::RoleAssigned(role) => {
                println!();
                println!(">>> Your role: {}", role.display_name());
            }
            Notice::DecisionRequested { request, reply } => {
                let decision = prompt_decision(&request);
                let _ = reply.send(decision);
            }
            Notice::MissionOutcome { success, sabotages } => {
                let verdict = if success { "SUCCEEDED" } else { "FAILED" };
                println!();
                println!(">>> Mission {verdict} ({sabotages} sabotage(s))");
            }
            Notice::GameOver { winner, history } => render_game_over(winner, &history),
            Notice::LogLine(text) => println!("* {text}"),
        }
    }
}

fn render_table(snapshot: &Snapshot) {
    let leader = snapshot.seat_name(snapshot.leader).unwrap_or("?");
    println!();
    println!(
        "-- round {} | leader {} | score {}:{} | rejections {} | {} --",
        snapshot.round,
        leader,
        snapshot.successes(),
        snapshot.failures(),
        snapshot.rejections,
        snapshot.phase,
    );
    for seat in &snapshot.seats {
        let lead = if seat.id == snapshot.leader { "*" } else { " " };
        let team = if snapshot.proposed_team.contains(&seat.id) {
            "+"
        } else {
            " "
        };
        let link = if seat.connected { "" } else { " (disconnected)" };
        println!("  {lead}{team} {} {}{link}", seat.id, seat.name);
    }
}

fn render_game_over(winner: Winner, history: &[MissionRecord]) {
    println!();
    println!("=== Game over: the {winner} win ===");
    for mission in history {
        let verdict = if mission.success { "success" } else { "failure" };
        println!(
            "  round {}: {} ({} sabotage(s))",
            mission.round, verdict, mission.sabotages
        );
    }
    if history.is_empty() {
        println!("  no mission ever left the table");
    }
}

fn prompt_decision(request: &DecisionRequest) -> Decision {
    match request {
        DecisionRequest::TeamSelection { size, deadline, .. } => {
            println!();
            println!(
                ">>> You lead this round. Pick your team ({}s to answer)",
                deadline.as_secs()
            );
            Decision::Team(read_team(*size))
        }
        DecisionRequest::Vote { proposal, deadline } => {
            let team = proposal
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!();
            println!(">>> Proposed team: {team} ({}s to answer)", deadline.as_secs());
            Decision::Vote(read_yes_no("Approve this team? [y/n] "))
        }
        DecisionRequest::Sabotage { deadline } => {
            println!();
            println!(">>> You are on the mission ({}s to answer)", deadline.as_secs());
            Decision::Sabotage(read_yes_no("Sabotage it? [y/n] "))
        }
    }
}

/// Read one trimmed line; `None` once stdin is gone
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim().to_string()),
        Err(_) => None,
    }
}

fn read_yes_no(prompt: &str) -> bool {
    loop {
        let Some(line) = read_line(prompt) else {
            return false;
        };
        match line.to_lowercase().as_str() {
            "y" | "yes" => return true,
            "n" | "no" => return false,
            _ => println!("Please answer y or n"),
        }
    }
}

fn read_team(size: u8) -> Vec<ParticipantId> {
    loop {
        let Some(line) = read_line(&format!("Pick {size} seats, space separated: ")) else {
            return Vec::new();
        };
        let picks: Result<Vec<ParticipantId>, _> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u8>().map(ParticipantId))
            .collect();
        match picks {
            Ok(picks) if picks.len() == size as usize => return picks,
            Ok(picks) => println!("That names {} seat(s), the team needs {size}", picks.len()),
            Err(_) => println!("Seats are numbers, 1 through 5"),
        }
    }
}
