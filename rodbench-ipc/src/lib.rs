#![warn(missing_docs)]
//! rodbench Control Protocol
//!
//! The request/response vocabulary a benchmark host speaks, and its two
//! bindings:
//! - [`line`]: newline-delimited text over a child process's stdio
//! - [`framing`]: rkyv frames with a length prefix, for sockets
//!
//! Both bindings carry the same [`HostRequest`] / [`HostResponse`] values,
//! so hosts and clients are written once against the logical protocol.

pub mod framing;
pub mod line;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, write_frame};
pub use line::{LineError, ResultLine, RunReply};
pub use messages::{
    BenchTarget, BenchmarkEntry, ErrorKind, HostRequest, HostResponse, RunOutcome, RunRequest,
    benchmark_name,
};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_frame_carries_version() {
        let mut buffer = Vec::new();
        write_frame(
            &mut buffer,
            &HostResponse::Ready {
                protocol_version: PROTOCOL_VERSION,
                benchmarks: 3,
            },
        )
        .unwrap();
        let decoded: HostResponse = read_frame(&mut std::io::Cursor::new(buffer)).unwrap();
        assert!(matches!(
            decoded,
            HostResponse::Ready {
                protocol_version: PROTOCOL_VERSION,
                benchmarks: 3
            }
        ));
    }
}
