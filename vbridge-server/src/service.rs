//! Server service loop.
//!
//! Accepts viewers on a TCP listener and drives every connection
//! through the core [`Server`] on the current thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use vbridge_core::Server;

use crate::backends;
use crate::config::ServerFileConfig;

/// Longest wait while no viewer is connected; bounds how late a
/// cleared stop flag is noticed.
pub const IDLE_WAIT: Duration = Duration::from_millis(250);

// ── VbridgeService ───────────────────────────────────────────────

/// The top-level server service.
///
/// Owns the configuration and a stop flag; [`run`](Self::run) builds
/// the core server and keeps polling it until the flag is cleared.
pub struct VbridgeService {
    config: ServerFileConfig,
    running: Arc<AtomicBool>,
}

impl VbridgeService {
    pub fn new(config: ServerFileConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the service until stopped.
    ///
    /// Binds the configured address and hands the listener to
    /// [`serve`](Self::serve).
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(self.config.network.listen.as_str()).await?;
        self.serve(listener).await
    }

    /// Serve viewers from `listener` until stopped.
    ///
    /// 1. Waits for a new viewer, a connection socket becoming ready, or
    ///    the poll interval, whichever is first.
    /// 2. Drives every connection once through [`Server::poll`].
    /// 3. Returns when `running` becomes `false`.
    ///
    /// Without connections the wait stretches to [`IDLE_WAIT`].
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);
        info!("listening on {}", listener.local_addr()?);

        let mut server: Server<TcpStream> =
            Server::new(self.config.to_server_config(), backends::build(&self.config));
        let tick = Duration::from_millis(self.config.network.poll_interval_ms.max(1));

        while self.running.load(Ordering::SeqCst) {
            let wait = if server.is_empty() { IDLE_WAIT.max(tick) } else { tick };
            let accepted = tokio::select! {
                result = listener.accept() => Some(result),
                _ = server.ready() => None,
                _ = tokio::time::sleep(wait) => None,
            };

            match accepted {
                Some(Ok((stream, _))) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("set_nodelay failed: {e}");
                    }
                    server.accept(stream);
                }
                Some(Err(e)) => warn!("accept error: {e}"),
                None => {}
            }

            server.poll();
        }

        info!(connections = server.len(), "server stopped");
        Ok(())
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserEntry;
    use std::time::Instant;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};
    use vbridge_core::{CoreClient, wait_ready};

    fn local_config() -> ServerFileConfig {
        let mut config = ServerFileConfig::default();
        config.network.listen = "127.0.0.1:0".into();
        config
    }

    #[test]
    fn service_creates_with_defaults() {
        let svc = VbridgeService::new(ServerFileConfig::default());
        assert!(!svc.is_running());
    }

    #[test]
    fn stop_handle_works() {
        let svc = VbridgeService::new(ServerFileConfig::default());
        let handle = svc.stop_handle();
        handle.store(true, Ordering::SeqCst);
        assert!(svc.is_running());
        svc.stop();
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn run_returns_once_stopped() {
        let svc = VbridgeService::new(local_config());
        let handle = svc.stop_handle();
        let (result, _) = tokio::join!(svc.run(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.store(false, Ordering::SeqCst);
        });
        assert_ok!(result);
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn run_fails_on_bad_address() {
        let mut config = local_config();
        config.network.listen = "not an address".into();
        let svc = VbridgeService::new(config);
        assert_err!(svc.run().await);
    }

    #[tokio::test]
    async fn login_is_answered_before_the_tick() {
        let mut config = local_config();
        config.network.poll_interval_ms = 60_000;
        config.auth.users.push(UserEntry {
            name: "ann".into(),
            password: "secret".into(),
            level: 2,
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let svc = VbridgeService::new(config);
        let handle = svc.stop_handle();

        let viewer = async {
            let mut client = CoreClient::new(TcpStream::connect(addr).await.unwrap());
            client.send_auth("ann", "secret");
            while client.access() == 0 {
                client.poll().unwrap();
                let ready = wait_ready(client.transport(), client.wants(Instant::now()));
                timeout(Duration::from_millis(20), ready).await.ok();
            }
            handle.store(false, Ordering::SeqCst);
            client.access()
        };
        let session = async { tokio::join!(svc.serve(listener), viewer) };
        let (served, access) = timeout(Duration::from_secs(10), session).await.unwrap();

        assert_ok!(served);
        assert_eq!(access, 2);
    }
}
