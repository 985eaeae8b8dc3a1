use bytes::{Buf, BufMut, Bytes, BytesMut};

use rtcp::{Marshall, MarshallError, Unmarshall, UnmarshallError};

/// The 12-byte-plus RTP header, per RFC 3550 section 5.1. `payload` carries
/// the remainder of the packet as an owned, contiguous byte range; resend
/// packets are distinguished from originals by the first two payload bytes
/// (the original sequence number), not by payload type.
#[derive(Debug, Clone, PartialEq)]
pub struct RtpPacket {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub seq: u16,
    pub payload_type: u8,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn original_seq_from_resend_payload(payload: &Bytes) -> Option<u16> {
        if payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([payload[0], payload[1]]))
    }

    /// Wraps this packet's payload with the retransmission header: the original
    /// sequence number prepended as two big-endian bytes, per section 4.C.
    pub fn into_resend_payload(self) -> Bytes {
        let mut out = BytesMut::with_capacity(2 + self.payload.len());
        out.put_u16(self.seq);
        out.put(self.payload);
        out.freeze()
    }
}

impl Unmarshall for RtpPacket {
    fn unmarshall(mut bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        if bytes.len() < 12 {
            return Err(UnmarshallError::InvalidLength);
        }

        let first_octet = bytes.get_u8();
        let version = (first_octet & VERSION_MASK) >> VERSION_SHIFT;
        if version != 2 {
            return Err(UnmarshallError::UnexpectedFrame);
        }

        let padding = ((first_octet & PADDING_MASK) >> PADDING_SHIFT) == 1;
        let extension = ((first_octet & EXTENSION_MASK) >> EXTENSION_SHIFT) == 1;
        let csrc_count = (first_octet & CSRC_COUNT_MASK) as usize;

        let second_octet = bytes.get_u8();
        let marker = ((second_octet & MARKER_MASK) >> MARKER_SHIFT) == 1;
        let payload_type = second_octet & PAYLOAD_TYPE_MASK;

        let seq = bytes.get_u16();
        let timestamp = bytes.get_u32();
        let ssrc = bytes.get_u32();

        if bytes.len() < csrc_count * 4 {
            return Err(UnmarshallError::InvalidLength);
        }
        let mut csrc = Vec::with_capacity(csrc_count);
        for _ in 0..csrc_count {
            csrc.push(bytes.get_u32());
        }

        if extension {
            if bytes.len() < 4 {
                return Err(UnmarshallError::InvalidLength);
            }
            // profile-specific id, skip
            bytes.get_u16();
            let ext_len_words = bytes.get_u16() as usize;
            let ext_len_bytes = ext_len_words * 4;
            if bytes.len() < ext_len_bytes {
                return Err(UnmarshallError::InvalidLength);
            }
            bytes.advance(ext_len_bytes);
        }

        let mut payload = bytes;
        if padding {
            let pad_len = payload.last().copied().unwrap_or(0) as usize;
            if pad_len == 0 || pad_len > payload.len() {
                return Err(UnmarshallError::UnexpectedFrame);
            }
            payload = payload.slice(0..payload.len() - pad_len);
        }

        Ok(Self {
            padding,
            extension,
            marker,
            seq,
            payload_type,
            timestamp,
            ssrc,
            csrc,
            payload,
        })
    }
}

impl Marshall for RtpPacket {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        if self.csrc.len() > 15 {
            return Err(MarshallError::InvalidLength);
        }

        let mut bytes = BytesMut::new();
        let version_bit = 2 << 6;
        let padding_bit = if self.padding { 1 } else { 0 } << 5;
        let extension_bit = if self.extension { 1 } else { 0 } << 4;
        let first_octet = version_bit | padding_bit | extension_bit | self.csrc.len() as u8;
        bytes.put_u8(first_octet);

        let marker_bit = if self.marker { 1 } else { 0 } << 7;
        bytes.put_u8(marker_bit | (self.payload_type & PAYLOAD_TYPE_MASK));
        bytes.put_u16(self.seq);
        bytes.put_u32(self.timestamp);
        bytes.put_u32(self.ssrc);
        for id in self.csrc {
            bytes.put_u32(id);
        }
        bytes.put(self.payload);

        Ok(bytes.freeze())
    }
}

static VERSION_MASK: u8 = 0b1100_0000;
static VERSION_SHIFT: u8 = 6;
static PADDING_MASK: u8 = 0b0010_0000;
static PADDING_SHIFT: u8 = 5;
static EXTENSION_MASK: u8 = 0b0001_0000;
static EXTENSION_SHIFT: u8 = 4;
static CSRC_COUNT_MASK: u8 = 0b0000_1111;
static MARKER_MASK: u8 = 0b1000_0000;
static MARKER_SHIFT: u8 = 7;
static PAYLOAD_TYPE_MASK: u8 = 0b0111_1111;

#[cfg(test)]
mod unmarshall_rtp_packet {
    use bytes::Bytes;
    use rtcp::Unmarshall;

    use super::RtpPacket;

    #[test]
    fn parses_minimal_packet() {
        let input = Bytes::from_static(&[
            128, 111, 2, 0, // V=2, no pad/ext/csrc, PT=111, seq=512
            0, 0, 0, 20, // ts
            0, 0, 0, 1, // ssrc
            1, 2, 3, 4, // payload
        ]);

        let packet = RtpPacket::unmarshall(input).unwrap();

        assert_eq!(packet.seq, 512);
        assert_eq!(packet.timestamp, 20);
        assert_eq!(packet.ssrc, 1);
        assert_eq!(packet.payload_type, 111);
        assert_eq!(&packet.payload[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_wrong_version() {
        let input = Bytes::from_static(&[0, 111, 2, 0, 0, 0, 0, 20, 0, 0, 0, 1]);

        assert!(RtpPacket::unmarshall(input).is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        let input = Bytes::from_static(&[128, 111, 2, 0]);

        assert!(RtpPacket::unmarshall(input).is_err());
    }

    #[test]
    fn strips_padding() {
        let input = Bytes::from_static(&[
            160, 111, 2, 0, // P=1
            0, 0, 0, 20,
            0, 0, 0, 1,
            1, 2, 3, 4, 0, 0, 3, // 3 bytes of padding, last byte = pad len
        ]);

        let packet = RtpPacket::unmarshall(input).unwrap();

        assert_eq!(&packet.payload[..], &[1, 2, 3, 4]);
    }
}
