//! Wire frames exchanged between processors.
//!
//! Every frame is a category-tagged byte payload: a fixed little-endian
//! header followed by raw data. The layout is bit-exact so that any two
//! implementations of this protocol can participate in the same job.

use anyhow::{bail, Result};

/// The four frame categories a fabric must deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub(crate) enum Category {
    VarPut = 0,
    VarGetRequest = 1,
    VarGetResponse = 2,
    Message = 3,
}

pub(crate) const NUM_CATEGORIES: usize = 4;

impl Category {
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// A received frame: the sender's processor id and the raw bytes.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) src: usize,
    pub(crate) payload: Vec<u8>,
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(buf[at..at + 8].try_into().unwrap())
}

/// Header of a `VarPut` frame; the payload is the raw bytes of the new
/// value region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PutHeader {
    pub(crate) var_id: i32,
    pub(crate) byte_offset: u64,
}

pub(crate) const PUT_HEADER_LEN: usize = 12;

impl PutHeader {
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.var_id.to_le_bytes());
        buf.extend_from_slice(&self.byte_offset.to_le_bytes());
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<PutHeader> {
        if buf.len() < PUT_HEADER_LEN {
            bail!("put frame too short: {} bytes", buf.len());
        }
        Ok(PutHeader {
            var_id: read_i32(buf, 0),
            byte_offset: read_u64(buf, 4),
        })
    }
}

/// Header of a `VarGetRequest` frame; there is no payload. `target` is an
/// opaque value the requester chooses and the responder echoes verbatim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GetRequestHeader {
    pub(crate) var_id: i32,
    pub(crate) byte_offset: u64,
    pub(crate) count: i32,
    pub(crate) elem_size: u64,
    pub(crate) target: u64,
}

pub(crate) const GET_REQUEST_HEADER_LEN: usize = 32;

impl GetRequestHeader {
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.var_id.to_le_bytes());
        buf.extend_from_slice(&self.byte_offset.to_le_bytes());
        buf.extend_from_slice(&self.count.to_le_bytes());
        buf.extend_from_slice(&self.elem_size.to_le_bytes());
        buf.extend_from_slice(&self.target.to_le_bytes());
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<GetRequestHeader> {
        if buf.len() < GET_REQUEST_HEADER_LEN {
            bail!("get request frame too short: {} bytes", buf.len());
        }
        Ok(GetRequestHeader {
            var_id: read_i32(buf, 0),
            byte_offset: read_u64(buf, 4),
            count: read_i32(buf, 12),
            elem_size: read_u64(buf, 16),
            target: read_u64(buf, 24),
        })
    }
}

/// Header of a `VarGetResponse` frame; the payload is the requested bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GetResponseHeader {
    pub(crate) target: u64,
    pub(crate) data_size: u64,
}

pub(crate) const GET_RESPONSE_HEADER_LEN: usize = 16;

impl GetResponseHeader {
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.target.to_le_bytes());
        buf.extend_from_slice(&self.data_size.to_le_bytes());
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<GetResponseHeader> {
        if buf.len() < GET_RESPONSE_HEADER_LEN {
            bail!("get response frame too short: {} bytes", buf.len());
        }
        Ok(GetResponseHeader {
            target: read_u64(buf, 0),
            data_size: read_u64(buf, 8),
        })
    }
}

/// Header of a `Message` frame; the payload is the encoded tag bytes
/// followed by the encoded content bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MessageHeader {
    pub(crate) queue_id: i32,
    pub(crate) tag_size: u32,
    pub(crate) content_size: u32,
}

pub(crate) const MESSAGE_HEADER_LEN: usize = 12;

impl MessageHeader {
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.queue_id.to_le_bytes());
        buf.extend_from_slice(&self.tag_size.to_le_bytes());
        buf.extend_from_slice(&self.content_size.to_le_bytes());
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<MessageHeader> {
        if buf.len() < MESSAGE_HEADER_LEN {
            bail!("message frame too short: {} bytes", buf.len());
        }
        Ok(MessageHeader {
            queue_id: read_i32(buf, 0),
            tag_size: read_u32(buf, 4),
            content_size: read_u32(buf, 8),
        })
    }
}
