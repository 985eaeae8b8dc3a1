use bytes::{BufMut, Bytes, BytesMut};

use crate::header::{self, Header};
use crate::rtcp::RtcpPacket;
use crate::{Marshall, MarshallError, Unmarshall, UnmarshallError};

/// Walks a compound RTCP packet sub-packet by sub-packet, using each sub-packet's own
/// length field to find the next one. Padding is only valid on the final sub-packet;
/// a padding bit set on an earlier one is rejected rather than silently consumed.
pub fn compound_unmarshall(bytes: Bytes) -> Result<Vec<RtcpPacket>, UnmarshallError> {
    let mut packets = vec![];
    let mut offset = 0usize;
    let total = bytes.len();

    if total == 0 {
        return Err(UnmarshallError::InvalidLength);
    }

    while offset < total {
        let remaining = bytes.slice(offset..);
        let sub_header = Header::unmarshall(remaining.clone())?;
        let byte_len = header::words_to_bytes(sub_header.length);

        if offset + byte_len > total {
            return Err(UnmarshallError::InvalidLength);
        }

        let is_last = offset + byte_len == total;
        if sub_header.padding && !is_last {
            return Err(UnmarshallError::UnexpectedFrame);
        }

        let sub_bytes = bytes.slice(offset..offset + byte_len);
        packets.push(RtcpPacket::unmarshall(sub_bytes)?);

        offset += byte_len;
    }

    Ok(packets)
}

pub fn compound_marshall(packets: Vec<RtcpPacket>) -> Result<Bytes, MarshallError> {
    let mut bytes = BytesMut::new();
    for packet in packets {
        bytes.put(packet.marshall()?);
    }
    Ok(bytes.freeze())
}
