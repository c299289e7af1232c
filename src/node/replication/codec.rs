//! Replication datagram framing
//!
//! Frame format (big endian):
//! [MAGIC:2][TYPE:1][SENDER_LEN:1][SENDER:n][PATH_LEN:2][PATH:m][PAYLOAD_LEN:4][PAYLOAD:k][CRC32:4]
//!
//! The CRC covers every byte before it. One frame per datagram.

use crate::common::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const FRAME_MAGIC: [u8; 2] = [0x4D, 0x52]; // "MR"

/// Largest UDP payload that fits an unfragmented IPv4 packet on a 1500-byte MTU
pub const MAX_DATAGRAM: usize = 1472;

/// Fixed bytes in every frame besides sender, path and payload
const FIXED_OVERHEAD: usize = 2 + 1 + 1 + 2 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Start = 1,
    Data = 2,
    End = 3,
    Error = 4,
}

impl MessageType {
    fn from_u8(val: u8) -> Option<Self> {
        match val {
            1 => Some(Self::Start),
            2 => Some(Self::Data),
            3 => Some(Self::End),
            4 => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationMessage {
    pub kind: MessageType,
    pub sender: String,
    pub path: String,
    pub payload: Bytes,
}

impl ReplicationMessage {
    pub fn start(sender: &str, path: &str) -> Self {
        Self::control(MessageType::Start, sender, path)
    }

    pub fn data(sender: &str, path: &str, payload: Bytes) -> Self {
        Self {
            kind: MessageType::Data,
            sender: sender.to_string(),
            path: path.to_string(),
            payload,
        }
    }

    pub fn end(sender: &str, path: &str) -> Self {
        Self::control(MessageType::End, sender, path)
    }

    pub fn error(sender: &str, path: &str) -> Self {
        Self::control(MessageType::Error, sender, path)
    }

    fn control(kind: MessageType, sender: &str, path: &str) -> Self {
        Self {
            kind,
            sender: sender.to_string(),
            path: path.to_string(),
            payload: Bytes::new(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        header_len(&self.sender, &self.path) + self.payload.len()
    }

    pub fn encode(&self) -> Result<Bytes> {
        if self.sender.len() > u8::MAX as usize {
            return Err(Error::Protocol(format!("sender id too long: {}", self.sender)));
        }
        if self.path.len() > u16::MAX as usize {
            return Err(Error::Protocol("path too long".into()));
        }
        let len = self.encoded_len();
        if len > MAX_DATAGRAM {
            return Err(Error::Protocol(format!(
                "frame of {} bytes exceeds datagram limit {}",
                len, MAX_DATAGRAM
            )));
        }

        let mut buf = BytesMut::with_capacity(len);
        buf.put_slice(&FRAME_MAGIC);
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.sender.len() as u8);
        buf.put_slice(self.sender.as_bytes());
        buf.put_u16(self.path.len() as u16);
        buf.put_slice(self.path.as_bytes());
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);
        Ok(buf.freeze())
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < FIXED_OVERHEAD {
            return Err(Error::Protocol(format!("short frame: {} bytes", frame.len())));
        }
        if frame.len() > MAX_DATAGRAM {
            return Err(Error::Protocol(format!("oversized frame: {} bytes", frame.len())));
        }
        let (body, trailer) = frame.split_at(frame.len() - 4);
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(Error::Protocol(format!(
                "checksum mismatch: expected {:08x}, got {:08x}",
                expected, actual
            )));
        }

        let mut buf = body;
        if buf.get(..2) != Some(&FRAME_MAGIC[..]) {
            return Err(Error::Protocol("bad magic".into()));
        }
        buf.advance(2);

        let kind = MessageType::from_u8(buf.get_u8())
            .ok_or_else(|| Error::Protocol("unknown message type".into()))?;
        let sender_len = buf.get_u8() as usize;
        let sender = take_str(&mut buf, sender_len)?;
        if buf.remaining() < 2 {
            return Err(Error::Protocol("truncated path length".into()));
        }
        let path_len = buf.get_u16() as usize;
        let path = take_str(&mut buf, path_len)?;
        if buf.remaining() < 4 {
            return Err(Error::Protocol("truncated payload length".into()));
        }
        let payload_len = buf.get_u32() as usize;
        if buf.remaining() != payload_len {
            return Err(Error::Protocol(format!(
                "payload length {} does not match {} remaining bytes",
                payload_len,
                buf.remaining()
            )));
        }

        Ok(Self {
            kind,
            sender,
            path,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

/// Bytes a frame spends on everything except its payload
pub fn header_len(sender: &str, path: &str) -> usize {
    FIXED_OVERHEAD + sender.len() + path.len()
}

fn take_str(buf: &mut &[u8], len: usize) -> Result<String> {
    if buf.remaining() < len {
        return Err(Error::Protocol("truncated frame".into()));
    }
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|_| Error::Protocol("invalid UTF-8".into()))?
        .to_string();
    buf.advance(len);
    Ok(s)
}
