//! Signals that end a long-running command

use tokio::signal;
use tracing::info;

use fleetlab_core::error::FleetResult;

/// Interrupt and terminate handlers, registered as soon as this is built
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignals {
    pub fn install() -> FleetResult<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for SIGINT or SIGTERM
    #[cfg(unix)]
    pub async fn recv(&mut self) -> FleetResult<()> {
        tokio::select! {
            _ = self.interrupt.recv() => info!("Received interrupt"),
            _ = self.terminate.recv() => info!("Received terminate signal"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> FleetResult<()> {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_terminate_is_a_shutdown_request() {
        let mut signals = ShutdownSignals::install().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .expect("SIGTERM was not observed")
            .unwrap();
    }
}
