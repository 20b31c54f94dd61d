//! Recovery of stdout and stderr from a container's combined output stream.
//!
//! Without a TTY, the engine multiplexes both streams into one byte stream.
//! Each frame starts with an 8-byte header:
//!
//! ```text
//! [stream, 0, 0, 0, len_be_u32...]
//! ```
//!
//! where `stream` is 0 for stdin, 1 for stdout and 2 for stderr. The payload
//! of `len` bytes follows.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

pub const HEADER_LEN: usize = 8;

/// Default cap for each collected stream.
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    fn from_byte(b: u8) -> Option<StreamKind> {
        match b {
            0 => Some(StreamKind::Stdin),
            1 => Some(StreamKind::Stdout),
            2 => Some(StreamKind::Stderr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub kind: StreamKind,
    pub payload: Bytes,
}

/// One piece of container output, as delivered by a [`SandboxEngine`].
///
/// Engines that split frames themselves hand out `Frame`s; others pass the
/// bytes through as `Raw`.
///
/// [`SandboxEngine`]: super::engine::SandboxEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Frame(StreamFrame),
    Raw(Bytes),
}

/// Parse a frame header, returning the stream and payload length.
fn parse_header(header: &[u8]) -> Option<(StreamKind, usize)> {
    if header.len() < HEADER_LEN || header[1..4] != [0, 0, 0] {
        return None;
    }
    let kind = StreamKind::from_byte(header[0])?;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    Some((kind, len))
}

/// Decoder for the multiplexed frame format.
///
/// Payloads are handed out as they arrive, so a frame announcing a huge length
/// is never buffered whole. One frame may therefore decode into several
/// [`StreamFrame`]s of the same stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct MuxFrameCodec {
    /// Stream and bytes left of the frame being read
    current: Option<(StreamKind, usize)>,
}

impl Decoder for MuxFrameCodec {
    type Item = StreamFrame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StreamFrame>, std::io::Error> {
        loop {
            if let Some((kind, remaining)) = self.current {
                if src.is_empty() {
                    return Ok(None);
                }
                let n = remaining.min(src.len());
                let payload = src.split_to(n).freeze();
                self.current = Some((kind, remaining - n)).filter(|(_, left)| *left > 0);
                return Ok(Some(StreamFrame { kind, payload }));
            }

            if src.len() < HEADER_LEN {
                return Ok(None);
            }
            let (kind, len) = parse_header(&src[..HEADER_LEN]).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid stream frame header")
            })?;
            src.advance(HEADER_LEN);
            if len > 0 {
                self.current = Some((kind, len));
            }
        }
    }
}

/// A byte buffer that silently stops growing at `size_limit`, remembering
/// that it did.
#[derive(Debug)]
pub struct CappedBuffer {
    size_limit: usize,
    bytes: BytesMut,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(size_limit: usize) -> Self {
        CappedBuffer {
            size_limit,
            bytes: BytesMut::new(),
            truncated: false,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        let room = self.size_limit.saturating_sub(self.bytes.len());
        if bytes.len() > room {
            self.bytes.extend_from_slice(&bytes[..room]);
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(bytes);
        }
    }

    pub fn is_oversized(&self) -> bool {
        self.truncated
    }

    pub fn into_string(self) -> String {
        let mut s = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            s.push_str(&format!(
                "\n--- output buffer capped out at {} bytes ---\n",
                self.size_limit
            ));
        }
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawMode {
    /// Not enough bytes seen yet to tell.
    Undecided,
    Framed,
    /// No valid header; everything is stdout.
    Passthrough,
}

/// Demultiplexed output of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Incremental demultiplexer feeding two [`CappedBuffer`]s.
#[derive(Debug)]
pub struct Demuxer {
    stdout: CappedBuffer,
    stderr: CappedBuffer,
    codec: MuxFrameCodec,
    pending: BytesMut,
    mode: RawMode,
}

impl Demuxer {
    pub fn new(size_limit: usize) -> Self {
        Demuxer {
            stdout: CappedBuffer::new(size_limit),
            stderr: CappedBuffer::new(size_limit),
            codec: MuxFrameCodec::default(),
            pending: BytesMut::new(),
            mode: RawMode::Undecided,
        }
    }

    pub fn push(&mut self, chunk: OutputChunk) {
        match chunk {
            OutputChunk::Frame(frame) => self.push_frame(frame),
            OutputChunk::Raw(bytes) => self.push_raw(&bytes),
        }
    }

    pub fn push_frame(&mut self, frame: StreamFrame) {
        match frame.kind {
            StreamKind::Stdout => self.stdout.append(&frame.payload),
            StreamKind::Stderr => self.stderr.append(&frame.payload),
            StreamKind::Stdin => {}
        }
    }

    /// Feed undecoded bytes. Frames may be split across calls.
    pub fn push_raw(&mut self, bytes: &[u8]) {
        if self.mode == RawMode::Passthrough {
            self.stdout.append(bytes);
            return;
        }

        self.pending.extend_from_slice(bytes);
        if self.mode == RawMode::Undecided {
            if self.pending.len() < HEADER_LEN {
                return;
            }
            if parse_header(&self.pending[..HEADER_LEN]).is_some() {
                self.mode = RawMode::Framed;
            } else {
                self.enter_passthrough();
                return;
            }
        }

        loop {
            match self.codec.decode(&mut self.pending) {
                Ok(Some(frame)) => self.push_frame(frame),
                Ok(None) => break,
                Err(_) => {
                    self.enter_passthrough();
                    break;
                }
            }
        }
    }

    fn enter_passthrough(&mut self) {
        tracing::debug!("output is not multiplexed, treating it as stdout");
        self.mode = RawMode::Passthrough;
        let pending = self.pending.split();
        self.stdout.append(&pending);
    }

    pub fn is_truncated(&self) -> bool {
        self.stdout.is_oversized() || self.stderr.is_oversized()
    }

    pub fn finish(mut self) -> DemuxedOutput {
        // Framed leftovers are at most an incomplete header.
        if self.mode != RawMode::Framed && !self.pending.is_empty() {
            let pending = self.pending.split();
            self.stdout.append(&pending);
        }
        DemuxedOutput {
            stdout: self.stdout.into_string(),
            stderr: self.stderr.into_string(),
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_frame(kind: StreamKind, payload: &[u8]) -> Vec<u8> {
    let stream = match kind {
        StreamKind::Stdin => 0u8,
        StreamKind::Stdout => 1,
        StreamKind::Stderr => 2,
    };
    let mut out = vec![stream, 0, 0, 0];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}
