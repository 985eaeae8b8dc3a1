use byteorder::ReadBytesExt;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::header::{Header, PayloadType};
use crate::{Marshall, MarshallError, Unmarshall, UnmarshallError};

/// A generic RTCP APP (204) packet. WFD does not define its own APP subtype; this is
/// carried through unopinionated so a sink's vendor extensions don't abort compound
/// parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct App {
    header: Header,
    pub subtype: u8,
    pub ssrc: u32,
    pub name: [u8; 4],
    pub data: Bytes,
}

impl App {
    pub fn new(subtype: u8, ssrc: u32, name: [u8; 4], data: Bytes) -> Self {
        let length = 2 + data.len().div_ceil(4) as u16;
        let header = Header {
            payload_type: PayloadType::App,
            length,
            feedback_message_type: subtype & 0b0001_1111,
            padding: false,
        };
        Self { header, subtype, ssrc, name, data }
    }
}

impl Marshall for App {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        let mut bytes = BytesMut::new();
        bytes.put(self.header.marshall()?);
        bytes.put_u32(self.ssrc);
        bytes.put(&self.name[..]);
        bytes.put(self.data.clone());
        let written = self.data.len();
        let padding = (4 - written % 4) % 4;
        bytes.put_bytes(0, padding);
        Ok(bytes.freeze())
    }
}

impl Unmarshall for App {
    fn unmarshall(bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        let header = Header::unmarshall(bytes.clone())?;
        if bytes.len() < 12 {
            return Err(UnmarshallError::InvalidLength);
        }
        let mut reader = bytes.slice(4..12).reader();
        let ssrc = reader.read_u32::<byteorder::BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let name_bytes = bytes.slice(8..12);
        let mut name = [0u8; 4];
        name.copy_from_slice(&name_bytes);

        let body_len = crate::header::words_to_bytes(header.length).saturating_sub(12);
        if bytes.len() < 12 + body_len {
            return Err(UnmarshallError::InvalidLength);
        }
        let data = bytes.slice(12..12 + body_len);

        Ok(App { subtype: header.feedback_message_type, header, ssrc, name, data })
    }
}
