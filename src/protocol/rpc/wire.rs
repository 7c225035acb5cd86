//! Value-at-a-time coder for byte streams, built on the Record Marking
//! Standard of RFC 5531 (previously RFC 1057 section 10).
//!
//! Every encoded value is written as one record: a sequence of fragments,
//! each prefixed with a 4-byte header whose highest bit marks the last
//! fragment and whose lower 31 bits carry the fragment length. The record
//! body holds the XDR encoding of the value.
//!
//! Because the decoder consumes exactly one record per call and never reads
//! past it, consecutive `encode`/`decode` calls on the same connection compose
//! without any outer framing, and raw stream bytes may follow the last record.

use std::io::Cursor;

use num_traits::FromPrimitive;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::protocol::xdr::rpc::{CallEnvelope, Tag};
use crate::protocol::xdr::{self, Deserialize, Serialize};

/// Default upper bound on the size of a single decoded record.
pub const DEFAULT_MAX_RECORD_LENGTH: usize = 16 * 1024 * 1024;

/// Maximum fragment size is 2^31 - 1 bytes
const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;

/// Initial size of the buffer a value is serialized into
const DEFAULT_ENCODE_BUFFER_CAPACITY: usize = 512;

/// Reads a single record-marked fragment from a stream
///
/// This function:
/// 1. Reads the 4-byte header from the stream
/// 2. Extracts the fragment length (lower 31 bits) and last-fragment flag (highest bit)
/// 3. Reads exactly that many bytes from the stream
/// 4. Appends the read data to the provided buffer
///
/// Returns true if this was the last fragment in the record, false otherwise.
async fn read_fragment<R: AsyncRead + Unpin + ?Sized>(
    stream: &mut R,
    append_to: &mut Vec<u8>,
    max_record_length: usize,
) -> std::io::Result<bool> {
    let mut header_buf = [0_u8; 4];
    stream.read_exact(&mut header_buf).await?;
    let fragment_header = u32::from_be_bytes(header_buf);
    let is_last = (fragment_header & (1 << 31)) > 0;
    let length = (fragment_header & ((1 << 31) - 1)) as usize;
    trace!("Reading fragment length:{}, last:{}", length, is_last);
    if append_to.len().saturating_add(length) > max_record_length {
        return Err(xdr::invalid_data(format!(
            "record length {} exceeds max {}",
            append_to.len().saturating_add(length),
            max_record_length
        )));
    }
    let start_offset = append_to.len();
    append_to.resize(start_offset + length, 0);
    stream.read_exact(&mut append_to[start_offset..]).await?;
    Ok(is_last)
}

/// Writes data as one record of record-marked fragments
///
/// Large buffers are split into fragments of at most 2^31 - 1 bytes. An
/// empty buffer still produces a single, empty, last fragment so the peer
/// can always tell where the record ends.
async fn write_record<W: AsyncWrite + Unpin + ?Sized>(
    stream: &mut W,
    buf: &[u8],
) -> std::io::Result<()> {
    let mut offset = 0;
    loop {
        let remaining = buf.len() - offset;
        let fragment_size = std::cmp::min(remaining, MAX_FRAGMENT_SIZE);
        let is_last = offset + fragment_size >= buf.len();

        // The highest bit indicates if this is the last fragment
        let fragment_header =
            if is_last { fragment_size as u32 + (1 << 31) } else { fragment_size as u32 };

        trace!("Writing fragment length:{}, last:{}", fragment_size, is_last);
        stream.write_all(&fragment_header.to_be_bytes()).await?;
        stream.write_all(&buf[offset..offset + fragment_size]).await?;

        offset += fragment_size;
        if is_last {
            return Ok(());
        }
    }
}

/// Encodes and decodes values on a byte stream.
///
/// The coder is stateless apart from its limits and can be shared freely
/// between connections.
#[derive(Clone, Copy, Debug)]
pub struct Coder {
    max_record_length: usize,
}

impl Default for Coder {
    fn default() -> Self {
        Self { max_record_length: DEFAULT_MAX_RECORD_LENGTH }
    }
}

impl Coder {
    /// Creates a coder that rejects records longer than `max_record_length`.
    pub fn new(max_record_length: usize) -> Self {
        Self { max_record_length }
    }

    /// Longest record this coder reads or writes, in bytes.
    pub fn max_record_length(&self) -> usize {
        self.max_record_length
    }

    /// Serializes `value` and writes it to `stream` as a single record.
    pub async fn encode<W, T>(&self, stream: &mut W, value: &T) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
        T: Serialize + ?Sized,
    {
        let mut buf = Vec::with_capacity(DEFAULT_ENCODE_BUFFER_CAPACITY);
        value.serialize(&mut buf)?;
        write_record(stream, &buf).await?;
        stream.flush().await
    }

    /// Reads one record from `stream` and deserializes it as `T`.
    ///
    /// Trailing bytes inside the record are treated as malformed input.
    pub async fn decode<R, T>(&self, stream: &mut R) -> std::io::Result<T>
    where
        R: AsyncRead + Unpin + ?Sized,
        T: Deserialize + Default,
    {
        let mut record = Vec::new();
        while !read_fragment(stream, &mut record, self.max_record_length).await? {}

        let mut cursor = Cursor::new(record.as_slice());
        let value = xdr::deserialize::<T>(&mut cursor)?;
        if cursor.position() as usize != record.len() {
            return Err(xdr::invalid_data(format!(
                "{} trailing bytes after value",
                record.len() - cursor.position() as usize
            )));
        }
        Ok(value)
    }

    /// Writes the connection purpose tag as a single raw byte.
    pub async fn write_tag<W>(&self, stream: &mut W, tag: Tag) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        stream.write_u8(tag as u8).await
    }

    /// Reads the connection purpose tag. Unknown values are `InvalidData`.
    pub async fn read_tag<R>(&self, stream: &mut R) -> std::io::Result<Tag>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let raw = stream.read_u8().await?;
        Tag::from_u8(raw).ok_or_else(|| xdr::invalid_data(format!("unrecognized tag {raw}")))
    }

    /// Sends a complete call: the [`Tag::Call`] byte, the method name record
    /// and the argument list record.
    pub async fn write_call<W>(&self, stream: &mut W, envelope: &CallEnvelope) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.write_tag(stream, Tag::Call).await?;
        self.encode(stream, envelope.method.as_str()).await?;
        self.encode(stream, envelope.args.as_slice()).await
    }
}
