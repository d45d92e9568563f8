use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::DecodeError;

/// OpenFlow protocol version spoken by this crate.
pub const OFP_VERSION: u8 = 0x01;

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        8
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: OfpHeader) {
        bytes.push(header.version());
        bytes.push(header.typ);
        bytes.write_u16::<BigEndian>(header.length() as u16).unwrap();
        bytes.write_u32::<BigEndian>(header.xid()).unwrap();
    }

    /// Parse the leading bytes of `buf` into an `OfpHeader`.
    pub fn parse(buf: &[u8]) -> Result<OfpHeader, DecodeError> {
        let mut bytes = Cursor::new(buf);
        Ok(OfpHeader {
            version: bytes
                .read_u8()
                .map_err(|_| DecodeError::truncated("header", "version"))?,
            typ: bytes
                .read_u8()
                .map_err(|_| DecodeError::truncated("header", "type"))?,
            length: bytes
                .read_u16::<BigEndian>()
                .map_err(|_| DecodeError::truncated("header", "length"))?,
            xid: bytes
                .read_u32::<BigEndian>()
                .map_err(|_| DecodeError::truncated("header", "xid"))?,
        })
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the raw OpenFlow message type code of a header. Mapping onto
    /// `MsgCode` happens at message-parse time, where an out-of-range code
    /// is a recoverable `DecodeError` rather than undefined behavior.
    pub fn type_code(&self) -> u8 {
        self.typ
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    /// Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}
