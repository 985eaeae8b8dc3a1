use byteorder::{BigEndian, ReadBytesExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::header::{Header, PayloadType};
use crate::receiver_report::ReportBlock;
use crate::{Marshall, MarshallError, Unmarshall, UnmarshallError};

#[derive(Debug, Clone, PartialEq)]
pub struct SenderReport {
    header: Header,
    pub sender_info: SenderInfo,
    pub reports: Vec<ReportBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SenderInfo {
    pub sender_ssrc: u32,
    pub ntp_timestamp: u64,
    pub rtp_timestamp: u32,
    pub sender_packet_count: u32,
    pub sender_octet_count: u32,
}

impl SenderReport {
    /// `reports` is capped at 31 per compound per RFC 3550; callers split beyond that.
    pub fn new(sender_info: SenderInfo, reports: Vec<ReportBlock>) -> Self {
        let header = Header {
            payload_type: PayloadType::SenderReport,
            length: (5 + reports.len() * 6) as u16,
            feedback_message_type: reports.len() as u8,
            padding: false,
        };
        Self { header, sender_info, reports }
    }
}

impl Unmarshall for SenderReport {
    fn unmarshall(bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        let header = Header::unmarshall(bytes.clone())?;
        if bytes.len() < 28 {
            return Err(UnmarshallError::InvalidLength);
        }

        let mut reader = bytes.slice(4..28).reader();
        let sender_ssrc = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let ntp_timestamp = reader.read_u64::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let rtp_timestamp = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let sender_packet_count = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let sender_octet_count = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;

        let report_count = header.feedback_message_type as usize;
        let mut reports = vec![];
        let mut offset = 28;
        for _ in 0..report_count {
            if bytes.len() < offset + 24 {
                return Err(UnmarshallError::InvalidLength);
            }
            reports.push(ReportBlock::unmarshall(bytes.slice(offset..offset + 24))?);
            offset += 24;
        }

        Ok(Self {
            header,
            sender_info: SenderInfo {
                ntp_timestamp,
                sender_ssrc,
                sender_packet_count,
                sender_octet_count,
                rtp_timestamp,
            },
            reports,
        })
    }
}

impl Marshall for SenderReport {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        let mut bytes = BytesMut::new();
        bytes.put(self.header.marshall()?);
        bytes.put_u32(self.sender_info.sender_ssrc);
        bytes.put_u64(self.sender_info.ntp_timestamp);
        bytes.put_u32(self.sender_info.rtp_timestamp);
        bytes.put_u32(self.sender_info.sender_packet_count);
        bytes.put_u32(self.sender_info.sender_octet_count);
        for report in self.reports {
            bytes.put(report.marshall()?);
        }
        Ok(bytes.freeze())
    }
}

#[cfg(test)]
mod sender_report_unmarshall {
    use bytes::Bytes;

    use crate::header::{Header, PayloadType};
    use crate::sender_report::{SenderInfo, SenderReport};
    use crate::Unmarshall;

    #[test]
    fn unmarshall_ok_report() {
        let input = Bytes::from_static(&[
            128, 200, 0, 6, // Header
            29, 71, 245, 255, // Sender SSRC = 491255295
            235, 90, 32, 152, // NTP timestamp MS
            101, 67, 120, 0, // NTP timestamp LS, NTP(64 bits) = 16958903185723062272
            28, 55, 243, 233, // RTP timestamp = 473428969
            0, 0, 15, 25, // Sender packet count = 3865
            0, 35, 115, 177], // Sender octet count = 2323377
        );

        let expected_output = SenderReport {
            header: Header {
                padding: false,
                length: 6,
                payload_type: PayloadType::SenderReport,
                feedback_message_type: 0,
            },
            sender_info: SenderInfo {
                ntp_timestamp: 16958903185723062272,
                rtp_timestamp: 473428969,
                sender_octet_count: 2323377,
                sender_packet_count: 3865,
                sender_ssrc: 491255295,
            },
            reports: vec![],
        };
        assert_eq!(SenderReport::unmarshall(input).unwrap(), expected_output);
    }
}
