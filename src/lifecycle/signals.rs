//! OS signal handling.
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The first Ctrl+C is handed to the caller; the handler never exits the
//!   process itself

/// Resolve on the next Ctrl+C. A failed handler registration never resolves.
pub async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Interrupt received");
}
