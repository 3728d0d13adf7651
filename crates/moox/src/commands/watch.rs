//! `moox watch` -- continuous polling with live output.
//!
//! Subscribes to the coordinator's snapshot, status, and event channels
//! and prints one line per change until Ctrl-C.

use chrono::Local;
use tokio::sync::broadcast;

use moox_core::{Coordinator, CoordinatorStatus, EventNotification, Snapshot};

use crate::error::CliError;

pub async fn run(coordinator: Coordinator) -> Result<(), CliError> {
    let mut snapshot_rx = coordinator.subscribe_snapshot();
    let mut status_rx = coordinator.subscribe_status();
    let mut events_rx = coordinator.subscribe_events();

    // The initial poll happens inside start(); a hard failure there
    // (bad credentials, fatal API error) aborts instead of looping.
    coordinator.start().await.map_err(CliError::from)?;
    snapshot_rx.mark_unchanged();
    status_rx.mark_unchanged();

    print_summary(&coordinator.snapshot());
    println!(
        "polling every {}s -- Ctrl-C to stop",
        coordinator.poll_interval().as_secs()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nshutting down");
                break;
            }
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                print_summary(&snapshot);
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                print_status(&status);
            }
            event = events_rx.recv() => {
                match event {
                    Ok(notification) => print_event(&notification),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

fn print_summary(snapshot: &Snapshot) {
    let with_position = snapshot.values().filter(|e| e.position.is_some()).count();
    println!(
        "[{}] snapshot: {} devices, {} with a position fix",
        timestamp(),
        snapshot.len(),
        with_position,
    );
}

fn print_status(status: &CoordinatorStatus) {
    match status {
        CoordinatorStatus::Idle | CoordinatorStatus::Fresh => {}
        CoordinatorStatus::Stale => {
            println!("[{}] degraded: serving last-known data", timestamp());
        }
        CoordinatorStatus::AuthRequired { message } => {
            println!("[{}] AUTHENTICATION REQUIRED: {message}", timestamp());
        }
        CoordinatorStatus::UpdateFailed { message } => {
            println!("[{}] update failed: {message}", timestamp());
        }
    }
}

fn print_event(notification: &EventNotification) {
    let device = notification
        .device_name
        .clone()
        .unwrap_or_else(|| format!("device {}", notification.device_id));
    println!(
        "[{}] event: {} -- {}",
        timestamp(),
        device,
        notification.event_name,
    );
}
