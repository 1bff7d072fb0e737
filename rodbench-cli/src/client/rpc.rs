//! RPC host client: framed requests over TCP.

use super::{ClientError, HostClient, TCP_SCHEME};
use rodbench_ipc::{
    BenchmarkEntry, FrameError, FrameReader, FrameWriter, HostRequest, HostResponse,
    PROTOCOL_VERSION, RunOutcome, RunRequest,
};
use std::net::TcpStream;
use tracing::{debug, trace, warn};

/// A connection to a host served with `--rod-listen`
pub struct RpcHost {
    label: String,
    reader: FrameReader<TcpStream>,
    writer: FrameWriter<TcpStream>,
}

impl RpcHost {
    /// Connect to `addr` and check the host's greeting.
    pub fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let mut host = Self {
            label: format!("{}{}", TCP_SCHEME, addr),
            reader: FrameReader::new(stream.try_clone()?),
            writer: FrameWriter::new(stream),
        };

        match host.receive()? {
            HostResponse::Ready {
                protocol_version,
                benchmarks,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(ClientError::Version {
                        host: protocol_version,
                        client: PROTOCOL_VERSION,
                    });
                }
                debug!(host = %host.label, benchmarks, "host ready");
                Ok(host)
            }
            other => Err(ClientError::Protocol(format!("expected Ready, got {:?}", other))),
        }
    }

    fn receive(&mut self) -> Result<HostResponse, ClientError> {
        let response: HostResponse = match self.reader.recv() {
            Ok(response) => response,
            Err(FrameError::EndOfStream) => return Err(ClientError::Closed),
            Err(e) => return Err(e.into()),
        };
        trace!(target: "rodbench::wire", host = %self.label, "< {:?}", response);
        Ok(response)
    }

    /// Send one request and return its response; host-reported errors become
    /// [`ClientError::Command`].
    fn request(&mut self, request: &HostRequest) -> Result<HostResponse, ClientError> {
        trace!(target: "rodbench::wire", host = %self.label, "> {:?}", request);
        self.writer.send(request)?;
        match self.receive()? {
            HostResponse::Error { kind, message } => Err(ClientError::Command { kind, message }),
            response => Ok(response),
        }
    }
}

impl HostClient for RpcHost {
    fn label(&self) -> &str {
        &self.label
    }

    fn list(&mut self) -> Result<Vec<BenchmarkEntry>, ClientError> {
        match self.request(&HostRequest::List {
            filter: ".".to_string(),
        })? {
            HostResponse::Benchmarks(entries) => Ok(entries),
            other => Err(ClientError::Protocol(format!("expected Benchmarks, got {:?}", other))),
        }
    }

    fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, ClientError> {
        match self.request(&HostRequest::Run(request.clone()))? {
            HostResponse::Outcome(outcome) => {
                if let Some(warning) = &outcome.warning {
                    warn!(host = %self.label, "warning: {}", warning);
                }
                Ok(outcome)
            }
            other => Err(ClientError::Protocol(format!("expected Outcome, got {:?}", other))),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ClientError> {
        match self.request(&HostRequest::Set {
            key: key.to_string(),
            value: value.to_string(),
        })? {
            HostResponse::Ack { .. } => Ok(()),
            other => Err(ClientError::Protocol(format!("expected Ack, got {:?}", other))),
        }
    }
}
