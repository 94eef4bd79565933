//! TCP reverse proxy that can be re-pointed while listening.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{Component, FailureReporter, ReverseProxy};
use crate::error::ComponentError;

/// Relays every accepted connection to `target_host:<forward port>`.
///
/// The forward port is read on each accept, so [`ReverseProxy::set_forward_port`]
/// takes effect for the next connection while open ones keep their target.
pub struct TcpReverseProxy {
    name: String,
    listen: String,
    target_host: String,
    forward_port: Arc<AtomicU16>,
    reporter: FailureReporter,
    token: CancellationToken,
    local_addr: OnceLock<SocketAddr>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpReverseProxy {
    /// Creates a proxy listening on `listen` (`host:port`).
    pub fn new(
        name: impl Into<String>,
        listen: impl Into<String>,
        target_host: impl Into<String>,
        forward_port: u16,
        reporter: FailureReporter,
    ) -> Self {
        Self {
            name: name.into(),
            listen: listen.into(),
            target_host: target_host.into(),
            forward_port: Arc::new(AtomicU16::new(forward_port)),
            reporter,
            token: CancellationToken::new(),
            local_addr: OnceLock::new(),
            task: Mutex::new(None),
        }
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    async fn accept_loop(
        listener: TcpListener,
        name: String,
        target_host: Arc<str>,
        forward_port: Arc<AtomicU16>,
        token: CancellationToken,
        reporter: FailureReporter,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                res = listener.accept() => res,
            };
            match accepted {
                Ok((inbound, peer)) => {
                    let port = forward_port.load(Ordering::Acquire);
                    trace!(proxy = %name, %peer, port, "relaying connection");
                    tokio::spawn(relay(
                        inbound,
                        Arc::clone(&target_host),
                        port,
                        token.child_token(),
                    ));
                }
                Err(source) => {
                    reporter.report(ComponentError::Io {
                        component: name.clone(),
                        source,
                    });
                    break;
                }
            }
        }
    }
}

async fn relay(mut inbound: TcpStream, host: Arc<str>, port: u16, token: CancellationToken) {
    let mut outbound = match TcpStream::connect((&*host, port)).await {
        Ok(s) => s,
        Err(e) => {
            // The app is restarting or not listening yet; the client just sees a reset.
            debug!(%host, port, error = %e, "upstream unavailable");
            return;
        }
    };
    tokio::select! {
        _ = token.cancelled() => {}
        res = copy_bidirectional(&mut inbound, &mut outbound) => {
            if let Err(e) = res {
                trace!(error = %e, "relay closed with error");
            }
        }
    }
}

#[async_trait]
impl Component for TcpReverseProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let listener = TcpListener::bind(&self.listen)
            .await
            .map_err(|source| ComponentError::Bind {
                component: self.name.clone(),
                addr: self.listen.clone(),
                source,
            })?;
        if let Ok(addr) = listener.local_addr() {
            let _ = self.local_addr.set(addr);
        }

        let handle = tokio::spawn(Self::accept_loop(
            listener,
            self.name.clone(),
            Arc::from(self.target_host.as_str()),
            Arc::clone(&self.forward_port),
            self.token.clone(),
            self.reporter.clone(),
        ));
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.token.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

impl ReverseProxy for TcpReverseProxy {
    fn forward_port(&self) -> u16 {
        self.forward_port.load(Ordering::Acquire)
    }

    fn set_forward_port(&self, port: u16) {
        self.forward_port.store(port, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Bus;
    use crate::outcome::Outcome;
    use crate::components::{RunEndAction, SessionHooks};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct NoHooks;

    #[async_trait]
    impl SessionHooks for NoHooks {
        async fn on_failure(&self, _err: ComponentError) {}
        async fn on_run_end(&self, _outcome: Outcome) -> RunEndAction {
            RunEndAction::Stop
        }
    }

    fn reporter() -> FailureReporter {
        FailureReporter::new(Arc::new(NoHooks), Bus::default())
    }

    async fn echo_server() -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            while let Ok((mut s, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 64];
                    let n = s.read(&mut buf).await.unwrap_or(0);
                    let _ = s.write_all(&buf[..n]).await;
                });
            }
        });
        (port, handle)
    }

    #[tokio::test]
    async fn relays_to_current_forward_port() {
        let (port, server) = echo_server().await;
        let proxy = TcpReverseProxy::new("proxy", "127.0.0.1:0", "127.0.0.1", 1, reporter());
        proxy.start().await.unwrap();
        proxy.set_forward_port(port);
        assert_eq!(proxy.forward_port(), port);

        let addr = proxy.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        proxy.stop().await;
        proxy.stop().await;
        server.abort();
    }

    #[tokio::test]
    async fn busy_port_is_a_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let proxy = TcpReverseProxy::new("proxy", addr, "127.0.0.1", 1, reporter());
        let err = proxy.start().await.unwrap_err();
        assert_eq!(err.as_label(), "component_bind");
        assert_eq!(err.component(), "proxy");
    }
}
