use byteorder::ReadBytesExt;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::header::{Header, PayloadType};
use crate::{Marshall, MarshallError, Unmarshall, UnmarshallError};

#[derive(Debug, Clone, PartialEq)]
pub struct Bye {
    header: Header,
    pub ssrcs: Vec<u32>,
    pub reason: Option<String>,
}

impl Bye {
    pub fn new(ssrcs: Vec<u32>, reason: Option<String>) -> Self {
        let reason_words = reason.as_ref().map(|r| (1 + r.len()).div_ceil(4)).unwrap_or(0);
        let length = ssrcs.len() as u16 + reason_words as u16;
        let header = Header {
            payload_type: PayloadType::Bye,
            length,
            feedback_message_type: ssrcs.len() as u8,
            padding: false,
        };
        Self { header, ssrcs, reason }
    }
}

impl Marshall for Bye {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        let mut bytes = BytesMut::new();
        bytes.put(self.header.marshall()?);
        for ssrc in &self.ssrcs {
            bytes.put_u32(*ssrc);
        }
        if let Some(reason) = self.reason {
            if reason.len() > 255 {
                return Err(MarshallError::InvalidLength);
            }
            bytes.put_u8(reason.len() as u8);
            bytes.put(reason.as_bytes());
            let written = 1 + reason.len();
            let padding = (4 - written % 4) % 4;
            bytes.put_bytes(0, padding);
        }
        Ok(bytes.freeze())
    }
}

impl Unmarshall for Bye {
    fn unmarshall(bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        let header = Header::unmarshall(bytes.clone())?;
        let ssrc_count = header.feedback_message_type as usize;
        let body_len = crate::header::words_to_bytes(header.length).saturating_sub(4);
        if bytes.len() < 4 + body_len {
            return Err(UnmarshallError::InvalidLength);
        }

        let mut reader = bytes.slice(4..).reader();
        let mut ssrcs = vec![];
        for _ in 0..ssrc_count {
            ssrcs.push(reader.read_u32::<byteorder::BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?);
        }

        let remaining = reader.into_inner();
        let reason = if remaining.is_empty() {
            None
        } else {
            let len = remaining[0] as usize;
            if remaining.len() < 1 + len {
                return Err(UnmarshallError::InvalidLength);
            }
            Some(String::from_utf8_lossy(&remaining[1..1 + len]).to_string())
        };

        Ok(Bye { header, ssrcs, reason })
    }
}

#[cfg(test)]
mod new_constructor {
    use super::*;

    #[test]
    fn builds_header_with_reason() {
        let bye = Bye::new(vec![1, 2], Some("bye".to_string()));
        assert_eq!(bye.header.feedback_message_type, 2);
    }
}

#[cfg(test)]
mod marshall_bye {
    use super::*;

    #[test]
    fn marshall_no_reason() {
        let bye = Bye::new(vec![1], None);
        assert_eq!(bye.marshall().unwrap(), Bytes::from_static(&[
            0b1000_0001, 203, 0, 1,
            0, 0, 0, 1,
        ]));
    }

    #[test]
    fn marshall_with_reason_padded() {
        let bye = Bye::new(vec![1], Some("hi".to_string()));
        assert_eq!(bye.marshall().unwrap(), Bytes::from_static(&[
            0b1000_0001, 203, 0, 2,
            0, 0, 0, 1,
            2, b'h', b'i', 0,
        ]));
    }
}

#[cfg(test)]
mod unmarshall_bye {
    use super::*;

    #[test]
    fn round_trips_with_reason() {
        let bye = Bye::new(vec![7, 9], Some("done".to_string()));
        let bytes = bye.clone().marshall().unwrap();
        assert_eq!(Bye::unmarshall(bytes).unwrap(), bye);
    }

    #[test]
    fn round_trips_without_reason() {
        let bye = Bye::new(vec![7], None);
        let bytes = bye.clone().marshall().unwrap();
        assert_eq!(Bye::unmarshall(bytes).unwrap(), bye);
    }
}
