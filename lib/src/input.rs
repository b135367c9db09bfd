//! Frame sources (TCP/file) and the bounded queue decoupling the reader from
//! the demuxer core.

use std::io::{Read, Write};
use std::net::TcpStream;

use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::warn;

use crate::error::{Error, Result};
use crate::vcdu::Vcdu;

const GOESRECV_HELLO: [u8; 8] = [0x00, 0x53, 0x50, 0x00, 0x00, 0x21, 0x00, 0x00];
const GOESRECV_ACK: [u8; 8] = [0x00, 0x53, 0x50, 0x00, 0x00, 0x20, 0x00, 0x00];

/// Pulls exactly one VCDU (892 bytes) per call, or `None` at clean end of
/// stream.
pub trait FrameSource {
    fn pull(&mut self) -> Result<Option<Vec<u8>>>;
}

/// TCP client to an "OSP" source: a raw back-to-back VCDU byte stream.
pub struct OspSource {
    stream: TcpStream,
}

impl OspSource {
    pub fn connect(addr: &str) -> Result<Self> {
        Ok(OspSource {
            stream: TcpStream::connect(addr)?,
        })
    }
}

impl FrameSource for OspSource {
    fn pull(&mut self) -> Result<Option<Vec<u8>>> {
        read_exact_or_eof(&mut self.stream, Vcdu::LEN)
    }
}

/// TCP client to a "goesrecv" source: a nanomsg-style handshake, then
/// `(8-byte header, 892-byte VCDU)` messages.
pub struct GoesRecvSource {
    stream: TcpStream,
}

impl GoesRecvSource {
    pub fn connect(addr: &str) -> Result<Self> {
        let mut stream = TcpStream::connect(addr)?;
        stream.write_all(&GOESRECV_HELLO)?;
        let mut resp = [0u8; 8];
        stream.read_exact(&mut resp)?;
        if resp != GOESRECV_ACK {
            return Err(Error::HandshakeFailed(format!(
                "unexpected goesrecv response: {resp:02x?}"
            )));
        }
        Ok(GoesRecvSource { stream })
    }
}

impl FrameSource for GoesRecvSource {
    fn pull(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prefix = [0u8; 8];
        match self.stream.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        read_exact_or_eof(&mut self.stream, Vcdu::LEN)
    }
}

/// Reads 892-byte chunks from a file until EOF. A trailing partial chunk is
/// discarded with a warning rather than treated as an error.
pub struct FileSource {
    file: std::fs::File,
}

impl FileSource {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        Ok(FileSource {
            file: std::fs::File::open(path)?,
        })
    }
}

impl FrameSource for FileSource {
    fn pull(&mut self) -> Result<Option<Vec<u8>>> {
        read_exact_or_eof(&mut self.file, Vcdu::LEN)
    }
}

/// Read exactly `len` bytes, or `None` if the stream is at a clean boundary.
/// A short read (fewer than `len` bytes before EOF) is logged and discarded,
/// matching the tolerance for a truncated trailing frame in file mode.
fn read_exact_or_eof<R: Read>(r: &mut R, len: usize) -> Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                warn!(filled, wanted = len, "short read at end of stream, discarding");
                return Ok(None);
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(buf))
}

/// Create a bounded frame queue decoupling the reader from the demuxer core.
/// The reader blocks on `push` when full rather than dropping frames.
#[must_use]
pub fn frame_queue(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = bounded(capacity);
    (FrameProducer { tx }, FrameConsumer { rx })
}

pub struct FrameProducer {
    tx: Sender<Vec<u8>>,
}

impl FrameProducer {
    /// Blocks if the queue is full.
    pub fn push(&self, frame: Vec<u8>) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| Error::InvalidHeader("frame queue consumer disconnected".into()))
    }
}

pub struct FrameConsumer {
    rx: Receiver<Vec<u8>>,
}

impl FrameConsumer {
    /// Blocks until a frame is available or the producer is dropped, in
    /// which case `None` signals a clean end of stream.
    pub fn pull(&self) -> Option<Vec<u8>> {
        self.rx.recv().ok()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
