//! Network RPC server
//!
//! Serves a [`Host`] over TCP using length-prefixed rkyv frames. Connections
//! are accepted one at a time and served to completion, so runs never
//! overlap. A `Quit` request stops the server; a client that simply
//! disconnects does not.

use crate::host::{Host, dispatch, ready};
use rodbench_ipc::{FrameError, FrameReader, FrameWriter, HostRequest};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use tracing::{info, warn};

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `Quit`
    Quit,
    /// The client closed the connection
    Disconnected,
}

/// TCP listener for the framed protocol
pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    /// Bind to `addr`. Port 0 picks a free port; see [`RpcServer::local_addr`].
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until a client sends `Quit`.
    pub fn serve(&self, host: &mut Host) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "listening");
        for stream in self.listener.incoming() {
            let stream = stream?;
            let peer = stream.peer_addr().ok();
            info!(?peer, "connection opened");
            match serve_connection(host, stream) {
                Ok(SessionEnd::Quit) => {
                    info!(?peer, "quit requested");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => info!(?peer, "connection closed"),
                Err(e) => warn!(?peer, error = %e, "connection dropped"),
            }
        }
        Ok(())
    }
}

/// Serve one connection: send `Ready`, then answer frames until the client
/// quits or hangs up.
pub fn serve_connection(host: &mut Host, stream: TcpStream) -> Result<SessionEnd, FrameError> {
    stream.set_nodelay(true)?;
    let mut reader = FrameReader::new(stream.try_clone()?);
    let mut writer = FrameWriter::new(stream);

    writer.send(&ready(host))?;
    loop {
        let request: HostRequest = match reader.recv() {
            Ok(request) => request,
            Err(FrameError::EndOfStream) => return Ok(SessionEnd::Disconnected),
            Err(e) => return Err(e),
        };
        match dispatch(host, request) {
            Some(response) => writer.send(&response)?,
            None => return Ok(SessionEnd::Quit),
        }
    }
}
