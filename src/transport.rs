//! Wire transport for RPCs between nodes.
//!
//! Each call opens a short-lived `tokio::net::TcpStream`, writes a
//! big-endian length prefix followed by a single `rmp_serde`-encoded
//! message (the same framing `store.rs` uses for on-disk encoding), and
//! reads a framed response back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

use crate::errors::*;
use crate::protos::{AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse, ServerId};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Envelope {
    RequestVoteRequest(RequestVoteRequest),
    RequestVoteResponse(RequestVoteResponse),
    AppendEntriesRequest(AppendEntriesRequest),
    AppendEntriesResponse(AppendEntriesResponse),
}

async fn write_envelope<W: AsyncWriteExt + Unpin>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    let bytes = rmp_serde::to_vec(envelope)?;
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_envelope<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Envelope> {
    let len = reader.read_u32().await?;
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(rmp_serde::from_slice(&buf)?)
}

/// Sends outbound RPCs to a named peer and awaits the matching response.
/// Implementations must not block the caller beyond the single request in
/// flight (§4.4: one request per peer at a time, tracked by
/// `ServerProgress::request_pending`).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_request_vote(
        &self,
        to: &ServerId,
        req: RequestVoteRequest,
    ) -> Result<RequestVoteResponse>;

    async fn send_append_entries(
        &self,
        to: &ServerId,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse>;
}

/// Handles inbound RPCs for one node. Implemented by `Node` (src/node.rs),
/// which locks the consensus module, runs the request through it, persists
/// if required, and returns the response.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle_request_vote(&self, req: RequestVoteRequest) -> RequestVoteResponse;

    async fn handle_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse;
}

/// Real network transport: one short-lived TCP connection per RPC, framed as
/// a 4-byte big-endian length prefix followed by an `rmp_serde`-encoded
/// [`Envelope`].
pub struct TcpTransport {
    addresses: HashMap<ServerId, std::net::SocketAddr>,
}

impl TcpTransport {
    pub fn new(addresses: HashMap<ServerId, std::net::SocketAddr>) -> Self {
        TcpTransport { addresses }
    }

    async fn call(&self, to: &ServerId, request: Envelope) -> Result<Envelope> {
        let addr = *self
            .addresses
            .get(to)
            .ok_or_else(|| format!("no known address for peer {}", to))?;
        let mut stream = TcpStream::connect(addr).await?;
        write_envelope(&mut stream, &request).await?;
        read_envelope(&mut stream).await
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_request_vote(
        &self,
        to: &ServerId,
        req: RequestVoteRequest,
    ) -> Result<RequestVoteResponse> {
        match self.call(to, Envelope::RequestVoteRequest(req)).await? {
            Envelope::RequestVoteResponse(resp) => Ok(resp),
            _ => bail!("peer {} replied with the wrong RPC kind", to),
        }
    }

    async fn send_append_entries(
        &self,
        to: &ServerId,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        match self.call(to, Envelope::AppendEntriesRequest(req)).await? {
            Envelope::AppendEntriesResponse(resp) => Ok(resp),
            _ => bail!("peer {} replied with the wrong RPC kind", to),
        }
    }
}

/// Accepts inbound connections and dispatches each request to `handler`,
/// one connection at a time (an RPC per connection, matching
/// [`TcpTransport`]'s client side).
pub async fn serve(
    listener: TcpListener,
    handler: Arc<dyn RpcHandler>,
) -> Result<()> {
    loop {
        let (mut stream, peer_addr) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            let request = match read_envelope(&mut stream).await {
                Ok(req) => req,
                Err(err) => {
                    error!(%peer_addr, error = %err, "failed to read RPC request");
                    return;
                }
            };
            let response = match request {
                Envelope::RequestVoteRequest(req) => {
                    Envelope::RequestVoteResponse(handler.handle_request_vote(req).await)
                }
                Envelope::AppendEntriesRequest(req) => {
                    Envelope::AppendEntriesResponse(handler.handle_append_entries(req).await)
                }
                _ => {
                    debug!(%peer_addr, "ignoring unexpected response-shaped request");
                    return;
                }
            };
            if let Err(err) = write_envelope(&mut stream, &response).await {
                error!(%peer_addr, error = %err, "failed to write RPC response");
            }
        });
    }
}

/// An in-process shared directory of node handlers, used by the scenario
/// test harness to simulate a cluster without binding any sockets.
#[derive(Default)]
pub struct InProcessNetwork {
    handlers: Mutex<HashMap<ServerId, Arc<dyn RpcHandler>>>,
}

impl InProcessNetwork {
    pub fn new() -> Self {
        InProcessNetwork {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, id: ServerId, handler: Arc<dyn RpcHandler>) {
        self.handlers.lock().unwrap().insert(id, handler);
    }

    /// Drops a node's handler, simulating a network partition: RPCs to it
    /// now fail instead of being delivered.
    pub fn unregister(&self, id: &ServerId) {
        self.handlers.lock().unwrap().remove(id);
    }

    fn lookup(&self, id: &ServerId) -> Result<Arc<dyn RpcHandler>> {
        self.handlers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| format!("peer {} is unreachable", id).into())
    }
}

pub struct InProcessTransport {
    network: Arc<InProcessNetwork>,
}

impl InProcessTransport {
    pub fn new(network: Arc<InProcessNetwork>) -> Self {
        InProcessTransport { network }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn send_request_vote(
        &self,
        to: &ServerId,
        req: RequestVoteRequest,
    ) -> Result<RequestVoteResponse> {
        let handler = self.network.lookup(to)?;
        Ok(handler.handle_request_vote(req).await)
    }

    async fn send_append_entries(
        &self,
        to: &ServerId,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let handler = self.network.lookup(to)?;
        Ok(handler.handle_append_entries(req).await)
    }
}
