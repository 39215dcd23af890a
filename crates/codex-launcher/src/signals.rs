//! OS shutdown signals delivered as a channel.

use tokio::sync::mpsc;
use tracing::{error, info};

/// Receives one message per SIGINT/SIGTERM (Ctrl-C on Windows).
pub(crate) fn shutdown_signals() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    #[cfg(unix)]
    std::thread::spawn(move || {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to register signal handlers: {e}");
                return;
            }
        };

        for sig in signals.forever() {
            info!("Received signal {sig}");
            if tx.send(format!("signal {sig}")).is_err() {
                break;
            }
        }
    });

    #[cfg(windows)]
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e}");
                break;
            }
            info!("Received Ctrl-C");
            if tx.send("Ctrl-C".to_string()).is_err() {
                break;
            }
        }
    });

    rx
}
