//! Wire-format definitions for RATS datagrams.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (opcode, sequence, length, checksum).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated, malformed or corrupted input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**, the checksum included.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Opcode     |                Sequence Number                :
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! :               |        Payload Length         |   Checksum    :
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! :               |            Payload ...                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 9 bytes.
//! opcode(1) + sequence(4) + payload_len(2) + checksum(2)

use std::fmt;

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 9;

/// Largest payload a single datagram may carry.
pub const MAX_PAYLOAD: usize = 1015;

/// Largest datagram the protocol ever produces (header + full payload).
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

// Byte offsets of each field within the serialised header.
const OFF_OPCODE: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_PAYLOAD_LEN: usize = 5;
const OFF_CHECKSUM: usize = 7;

/// The role a packet plays in the exchange.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Receiver asks for a file; payload is the path.
    FileRequest = 0x00,
    /// One chunk of file data; sequence is the chunk index.
    Data = 0x01,
    /// Cumulative acknowledgement; payload is the next expected sequence.
    Ack = 0x02,
    /// The requested file cannot be served.
    FileNotFound = 0x03,
    FileNotFoundAck = 0x04,
    /// Every chunk has been acknowledged; sequence is the chunk count.
    Done = 0x05,
    DoneAck = 0x06,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Opcode::FileRequest,
            0x01 => Opcode::Data,
            0x02 => Opcode::Ack,
            0x03 => Opcode::FileNotFound,
            0x04 => Opcode::FileNotFoundAck,
            0x05 => Opcode::Done,
            0x06 => Opcode::DoneAck,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::FileRequest => "REQUEST",
            Opcode::Data => "DATA",
            Opcode::Ack => "ACK",
            Opcode::FileNotFound => "NOT_FOUND",
            Opcode::FileNotFoundAck => "NOT_FOUND_ACK",
            Opcode::Done => "DONE",
            Opcode::DoneAck => "DONE_ACK",
        };
        f.write_str(name)
    }
}

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Packet::encode`] converts to big-endian
/// on the wire and [`Packet::decode`] converts back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub opcode: Opcode,
    /// Chunk index for `Data`, chunk count for `Done`, zero otherwise.
    pub seq: u32,
    /// Length of the payload in bytes.
    ///
    /// On encode this is computed from the actual payload length.
    /// On decode this is validated against the remaining buffer bytes.
    pub payload_len: u16,
    /// Internet-style checksum over the entire serialised packet.
    ///
    /// On encode this is computed and written last.
    /// On decode this is verified before the packet is returned.
    pub checksum: u16,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet; `payload_len` and `checksum` are filled in by
    /// [`Packet::encode`].
    pub fn new(opcode: Opcode, seq: u32, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                opcode,
                seq,
                payload_len: 0,
                checksum: 0,
            },
            payload,
        }
    }

    pub fn file_request(path: &str) -> Self {
        Self::new(Opcode::FileRequest, 0, path.as_bytes().to_vec())
    }

    pub fn data(seq: u32, chunk: Vec<u8>) -> Self {
        Self::new(Opcode::Data, seq, chunk)
    }

    /// Cumulative ACK announcing `next` as the next expected chunk.
    pub fn ack(next: u32) -> Self {
        Self::new(Opcode::Ack, 0, next.to_be_bytes().to_vec())
    }

    /// A packet with no payload (`FileNotFound`, `Done` and the two ACKs).
    pub fn control(opcode: Opcode, seq: u32) -> Self {
        Self::new(opcode, seq, Vec::new())
    }

    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    /// The next-expected sequence carried by an `Ack`.
    pub fn ack_value(&self) -> Result<u32, PacketError> {
        let bytes: [u8; 4] = self
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| PacketError::BadAckPayload(self.payload.len()))?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// `header.payload_len` and `header.checksum` are computed from the actual
    /// payload; any values already stored in those fields are ignored.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let payload_len = self.payload.len();
        if payload_len > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(payload_len));
        }
        let mut buf = vec![0u8; HEADER_LEN + payload_len];

        buf[OFF_OPCODE] = self.header.opcode.to_u8();
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq.to_be_bytes());
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2]
            .copy_from_slice(&(payload_len as u16).to_be_bytes());
        // Checksum field is zero while computing the checksum.
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&0u16.to_be_bytes());

        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());

        Ok(buf)
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`] (checked before any field is read),
    /// - the checksum does not verify,
    /// - the `payload_len` field is too large or disagrees with `buf.len()`, or
    /// - the opcode byte is not a known [`Opcode`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Truncated(buf.len()));
        }

        // The stored checksum takes part in the sum; a valid packet sums to zero.
        if checksum(buf) != 0 {
            return Err(PacketError::Corrupt);
        }

        let seq = u32::from_be_bytes([
            buf[OFF_SEQ],
            buf[OFF_SEQ + 1],
            buf[OFF_SEQ + 2],
            buf[OFF_SEQ + 3],
        ]);
        let payload_len = u16::from_be_bytes([buf[OFF_PAYLOAD_LEN], buf[OFF_PAYLOAD_LEN + 1]]);
        let stored = u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);

        if usize::from(payload_len) > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(usize::from(payload_len)));
        }
        if buf.len() != HEADER_LEN + usize::from(payload_len) {
            return Err(PacketError::LengthMismatch {
                declared: payload_len,
                actual: buf.len() - HEADER_LEN,
            });
        }

        let opcode =
            Opcode::from_u8(buf[OFF_OPCODE]).ok_or(PacketError::UnknownOpcode(buf[OFF_OPCODE]))?;

        Ok(Packet {
            header: Header {
                opcode,
                seq,
                payload_len,
                checksum: stored,
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when building or parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is too short to contain a header")]
    Truncated(usize),
    #[error("payload_len field says {declared} bytes but {actual} follow the header")]
    LengthMismatch { declared: u16, actual: usize },
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD}-byte limit")]
    PayloadTooLarge(usize),
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("checksum verification failed")]
    Corrupt,
    #[error("ACK payload must be 4 bytes, got {0}")]
    BadAckPayload(usize),
}

/// Compute the Internet-style checksum over `data`.
///
/// Sums consecutive 16-bit words read low byte first, folding the carry after
/// every addition, and returns the one's complement.  A trailing odd byte is
/// added as a word with a zero high byte.
///
/// Running this over a buffer that already carries its checksum yields zero.
/// Like every ones'-complement sum it cannot see swapped 16-bit words, nor
/// tell a 0x0000 word from a 0xFFFF one.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_le_bytes([word[0], word[1]]));
        sum = (sum & 0xffff) + (sum >> 16);
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last);
        sum = (sum & 0xffff) + (sum >> 16);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}
