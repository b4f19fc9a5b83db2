//! Listener lifecycle.
//!
//! The controller owns the accept loop: it binds the configured port
//! (walking a fixed fallback list when the address is taken), spawns one
//! task per accepted connection, and fans a shutdown signal out to every
//! live connection through a watch channel.  `running`, `port` and
//! `last_error` are readable from any thread via [`ServerStatus`].

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::http::conn::serve_connection;
use crate::state::AppState;

/// Ports tried, in order, when the configured one is occupied.
pub const FALLBACK_PORTS: &[u16] = &[11434, 11435, 11436, 11437, 8080];

/// Thread-safe view of the listener state.
#[derive(Debug)]
pub struct ServerStatus {
    running: AtomicBool,
    port: AtomicU16,
    last_error: Mutex<Option<String>>,
}

impl ServerStatus {
    pub fn new(port: u16) -> Self {
        Self {
            running: AtomicBool::new(false),
            port: AtomicU16::new(port),
            last_error: Mutex::new(None),
        }
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
    }

    fn set_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }
}

/// Owns the accept task and the shutdown channel.
pub struct ServerController {
    state: Arc<AppState>,
    host: String,
    configured_port: u16,
    fallback_ports: Vec<u16>,
    shutdown_tx: Option<watch::Sender<bool>>,
    accept_task: Option<JoinHandle<()>>,
}

impl ServerController {
    pub fn new(state: Arc<AppState>, host: String, port: u16) -> Self {
        Self {
            state,
            host,
            configured_port: port,
            fallback_ports: FALLBACK_PORTS.to_vec(),
            shutdown_tx: None,
            accept_task: None,
        }
    }

    /// Override the fallback list (tests bind ephemeral ports).
    pub fn with_fallback_ports(mut self, ports: Vec<u16>) -> Self {
        self.fallback_ports = ports;
        self
    }

    pub fn status(&self) -> Arc<ServerStatus> {
        Arc::clone(&self.state.status)
    }

    /// Bind and start accepting.  Idempotent while running.
    pub async fn start(&mut self) {
        let status = self.status();
        if status.running() {
            info!(port = status.port(), "server already running");
            return;
        }

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(message) => {
                error!(error = %message, "failed to start listener");
                status.set_error(Some(message));
                status.set_running(false);
                return;
            }
        };

        let port = listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(self.configured_port);
        status.set_error(None);
        status.set_port(port);
        status.set_running(true);
        info!(host = %self.host, port, "gateway listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);
        let state = Arc::clone(&self.state);
        self.accept_task = Some(tokio::spawn(accept_loop(listener, state, shutdown_rx)));
    }

    /// Cancel the listener and every live connection.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        self.status().set_running(false);
        info!("gateway stopped");
    }

    /// `stop()` then `start()` on the stored port.
    pub async fn restart(&mut self) {
        self.stop().await;
        self.start().await;
    }

    /// Try the configured port, then the fallback list on address-in-use.
    async fn bind(&self) -> Result<TcpListener, String> {
        let mut candidates = vec![self.configured_port];
        candidates.extend(
            self.fallback_ports
                .iter()
                .copied()
                .filter(|p| *p != self.configured_port),
        );

        for port in candidates {
            match TcpListener::bind((self.host.as_str(), port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    warn!(port, "port in use; trying next fallback");
                }
                Err(e) => return Err(format!("bind {}:{port} failed: {e}", self.host)),
            }
        }
        Err("all candidate ports are in use".to_owned())
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    debug!(%peer, "connection accepted");
                    let state = Arc::clone(&state);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        serve_connection(socket, state, shutdown).await;
                    });
                }
                Err(e) => warn!(error = %e, "accept error"),
            }
        }
    }
    debug!("accept loop exited");
}
