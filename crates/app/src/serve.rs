//! Host a session
//!
//! Starts the coordinator, hands the console bridge to a phase driver
//! and lets it run the table to a winner. Ctrl-C abandons the session.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use turncoat_core::GameConfig;
use turncoat_net::{Coordinator, PhaseDriver, Result};

use crate::presenter;

pub async fn run(config_path: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => GameConfig::load(&path)?,
        None => GameConfig::default(),
    };
    if let Some(port) = port {
        config.port = port;
    }

    let coordinator = Arc::new(Coordinator::start(config).await?);
    info!(addr = %coordinator.addr(), "Coordinator listening");
    println!("Table open on {}", coordinator.addr());

    let (bridge, console) = presenter::spawn_console();
    let driver = PhaseDriver::new(coordinator.clone(), bridge);

    tokio::select! {
        result = driver.run() => {
            let report = result?;
            info!(winner = %report.winner, "Session complete");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing the table");
        }
    }

    coordinator.shutdown();
    console.finish();
    Ok(())
}
