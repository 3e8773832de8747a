//! TCP-to-vsock bridge. `spec.md` §4.8: one host TCP listener per route with
//! a vsock backend; each accepted connection is proxied to a guest
//! `(CID, port)` with bidirectional byte copying until either side closes.
//!
//! Grounded on `examples/Bryasxin-judge-core/crates/agent/src/main.rs`, the
//! only file in the retrieval pack that drives real vsock I/O
//! (`tokio_vsock::{VsockAddr, VsockStream}`), generalized from "dial once at
//! startup" to "accept many TCP connections, dial vsock per connection".

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_vsock::{VsockAddr, VsockStream};
use tracing::{debug, info, warn};

use crate::error::{DataplaneError, Result};
use crate::portmap::PROTO_TCP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ListenerKey {
    proto: u8,
    host_port: u16,
}

struct Listener {
    handle: JoinHandle<()>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Owns the set of active TCP-to-vsock proxies.
#[derive(Default)]
pub struct VsockBridge {
    listeners: Mutex<HashMap<ListenerKey, Listener>>,
}

impl VsockBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or replace) the listener for `(proto, host_port)`, proxying
    /// every accepted connection to `(cid, guest_port)`. Only TCP is
    /// supported; `spec.md` §4.8 rejects UDP-over-vsock at validation.
    pub async fn upsert(&self, proto: u8, host_port: u16, cid: u32, guest_port: u32) -> Result<()> {
        if proto != PROTO_TCP {
            return Err(DataplaneError::VsockRequiresTcp);
        }

        let tcp_listener = TcpListener::bind(("0.0.0.0", host_port)).await?;
        info!(host_port, cid, guest_port, "vsock bridge listening");

        let handle = tokio::spawn(async move {
            loop {
                match tcp_listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted tcp connection for vsock bridge");
                        tokio::spawn(proxy_connection(stream, cid, guest_port));
                    }
                    Err(e) => {
                        warn!(error = %e, "vsock bridge accept error, stopping listener");
                        return;
                    }
                }
            }
        });

        let key = ListenerKey { proto, host_port };
        self.listeners.lock().insert(key, Listener { handle });
        Ok(())
    }

    /// Stop and drop the listener for `(proto, host_port)`. A missing key is
    /// not an error.
    pub fn remove(&self, proto: u8, host_port: u16) {
        self.listeners.lock().remove(&ListenerKey { proto, host_port });
    }

    /// Stop every listener.
    pub fn close(&self) {
        self.listeners.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }
}

async fn proxy_connection(mut tcp: TcpStream, cid: u32, guest_port: u32) {
    let addr = VsockAddr::new(cid, guest_port);
    let mut vsock = match VsockStream::connect(addr).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, cid, guest_port, "vsock dial failed, dropping connection");
            return;
        }
    };

    if let Err(e) = tokio::io::copy_bidirectional(&mut tcp, &mut vsock).await {
        debug!(error = %e, "vsock bridge connection closed");
    }
    let _ = tcp.shutdown().await;
    let _ = vsock.shutdown().await;
}
