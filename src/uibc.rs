use bytes::{Buf, Bytes};

/// Generic UIBC event *decoding* is out of scope (section 1's Non-goals);
/// this only splits the wire framing so a caller can dispatch the payload
/// elsewhere. A UIBC PDU is `type:u8 length:u16 payload[length]`, matching
/// the TLV shape WFD 1.0 defines for both generic and HIDC input events.
#[derive(Debug, Clone, PartialEq)]
pub struct UibcFrame {
    pub event_type: u8,
    pub payload: Bytes,
}

#[derive(Debug, PartialEq)]
pub enum UibcFrameError {
    Truncated,
}

pub fn parse_frame(mut bytes: Bytes) -> Result<UibcFrame, UibcFrameError> {
    if bytes.len() < 3 {
        return Err(UibcFrameError::Truncated);
    }
    let event_type = bytes.get_u8();
    let length = bytes.get_u16() as usize;
    if bytes.remaining() < length {
        return Err(UibcFrameError::Truncated);
    }
    let payload = bytes.copy_to_bytes(length);
    Ok(UibcFrame { event_type, payload })
}

pub fn encode_frame(frame: &UibcFrame) -> Bytes {
    let mut out = bytes::BytesMut::with_capacity(3 + frame.payload.len());
    out.extend_from_slice(&[frame.event_type]);
    out.extend_from_slice(&(frame.payload.len() as u16).to_be_bytes());
    out.extend_from_slice(&frame.payload);
    out.freeze()
}

#[cfg(test)]
mod uibc {
    use bytes::Bytes;

    use super::{encode_frame, parse_frame, UibcFrame, UibcFrameError};

    #[test]
    fn round_trips_a_frame() {
        let frame = UibcFrame { event_type: 2, payload: Bytes::from_static(b"click") };

        let encoded = encode_frame(&frame);
        let decoded = parse_frame(encoded).unwrap();

        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_truncated_payload() {
        let bytes = Bytes::from_static(&[1, 0, 10, 1, 2]);

        assert_eq!(parse_frame(bytes), Err(UibcFrameError::Truncated));
    }

    #[test]
    fn rejects_header_shorter_than_three_bytes() {
        let bytes = Bytes::from_static(&[1, 0]);

        assert_eq!(parse_frame(bytes), Err(UibcFrameError::Truncated));
    }
}
