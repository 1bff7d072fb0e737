//! Length-Prefixed Frame Encoding
//!
//! Message boundaries for the RPC binding. Works over any byte stream
//! (TCP sockets, pipes, in-memory buffers).
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | rkyv payload     |
//! +----------------+------------------+
//! ```

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use thiserror::Error;

/// Maximum frame size (16 MB) to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// rkyv could not encode the message
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Payload failed validation or decoding
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Length prefix above [`MAX_FRAME_SIZE`]
    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Announced size
        size: usize,
        /// Limit
        max: usize,
    },

    /// Truncated or otherwise unusable frame
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Peer closed the stream between frames
    #[error("End of stream")]
    EndOfStream,
}

/// Serialize `message` and write it as one frame, then flush.
pub fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let bytes =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    if bytes.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and deserialize it.
///
/// A clean end of stream before the length prefix is [`FrameError::EndOfStream`];
/// a stream that ends inside a frame is an I/O error.
pub fn read_frame<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(FrameError::EndOfStream),
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    if len == 0 {
        return Err(FrameError::InvalidFrame("zero-length frame".to_string()));
    }

    // rkyv needs an aligned buffer to validate in place
    let mut buf = rkyv::AlignedVec::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf)?;

    let archived = rkyv::check_archived_root::<T>(&buf)
        .map_err(|e| FrameError::Deserialization(e.to_string()))?;

    archived
        .deserialize(&mut Infallible)
        .map_err(|never| match never {})
}

/// Buffered frame sender
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(16 * 1024, writer),
        }
    }

    /// Send one message (flushes)
    pub fn send<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        write_frame(&mut self.writer, message)
    }

    /// Borrow the underlying writer
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

/// Buffered frame receiver
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(16 * 1024, reader),
        }
    }

    /// Receive one message
    pub fn recv<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        read_frame(&mut self.reader)
    }

    /// Borrow the underlying reader
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BenchTarget, HostRequest, HostResponse, RunOutcome, RunRequest};
    use std::io::Cursor;

    #[test]
    fn test_request_sequence() {
        let requests = vec![
            HostRequest::List {
                filter: ".".to_string(),
            },
            HostRequest::Run(RunRequest::new(BenchTarget::Index(3), 1000).with_parallelism(4)),
            HostRequest::Quit,
        ];

        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for request in &requests {
                writer.send(request).unwrap();
            }
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        for expected in &requests {
            let decoded: HostRequest = reader.recv().unwrap();
            assert_eq!(expected, &decoded);
        }
        let end: Result<HostRequest, _> = reader.recv();
        assert!(matches!(end, Err(FrameError::EndOfStream)));
    }

    #[test]
    fn test_outcome_frame() {
        let response = HostResponse::Outcome(RunOutcome::failure("BenchmarkX", 1, "panicked"));
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &response).unwrap();

        assert_eq!(
            u32::from_le_bytes(buffer[..4].try_into().unwrap()) as usize,
            buffer.len() - 4
        );
        let decoded: HostResponse = read_frame(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_truncated_frame_is_io_error() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &HostRequest::Help).unwrap();
        buffer.truncate(buffer.len() - 1);

        let result: Result<HostRequest, _> = read_frame(&mut Cursor::new(buffer));
        assert!(matches!(result, Err(FrameError::Io(_))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let buffer = ((MAX_FRAME_SIZE + 1) as u32).to_le_bytes().to_vec();
        let result: Result<HostRequest, _> = read_frame(&mut Cursor::new(buffer));
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_zero_length_rejected() {
        let buffer = 0u32.to_le_bytes().to_vec();
        let result: Result<HostRequest, _> = read_frame(&mut Cursor::new(buffer));
        assert!(matches!(result, Err(FrameError::InvalidFrame(_))));
    }
}
