use byteorder::{BigEndian, ReadBytesExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::header::{Header, PayloadType};
use crate::{Marshall, MarshallError, Unmarshall, UnmarshallError};

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverReport {
    header: Header,
    pub sender_ssrc: u32,
    pub reports: Vec<ReportBlock>,
}

impl ReceiverReport {
    pub fn new(sender_ssrc: u32, reports: Vec<ReportBlock>) -> Self {
        let header = Header {
            length: (1 + reports.len() * 6) as u16, // Sender SSRC 32-bit word + N-report_blocks * 6 32-bit words
            payload_type: PayloadType::ReceiverReport,
            padding: false,
            feedback_message_type: reports.len() as u8,
        };

        Self { reports, sender_ssrc, header }
    }
}

impl Marshall for ReceiverReport {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        let mut bytes = BytesMut::new();
        bytes.put(self.header.marshall()?);
        bytes.put_u32(self.sender_ssrc);
        for report in self.reports {
            bytes.put(report.marshall()?);
        };
        Ok(bytes.freeze())
    }
}

impl Unmarshall for ReceiverReport {
    fn unmarshall(bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        let header = Header::unmarshall(bytes.clone())?;
        if bytes.len() < 8 {
            return Err(UnmarshallError::InvalidLength);
        }

        let mut reader = bytes.slice(4..8).reader();
        let sender_ssrc = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;

        let report_count = header.feedback_message_type as usize;
        let mut reports = vec![];
        let mut offset = 8;
        for _ in 0..report_count {
            if bytes.len() < offset + 24 {
                return Err(UnmarshallError::InvalidLength);
            }
            reports.push(ReportBlock::unmarshall(bytes.slice(offset..offset + 24))?);
            offset += 24;
        }

        Ok(Self { header, sender_ssrc, reports })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_packets_lost: u32,
    pub ext_highest_sequence: u32,
    pub jitter: u32,
    pub lsr: u32,
    pub dlsr: u32,
}

impl Marshall for ReportBlock {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        let mut bytes = BytesMut::new();
        bytes.put_u32(self.ssrc);
        bytes.put_u8(self.fraction_lost);
        let cumulative_packet_lost_frame = self.cumulative_packets_lost.to_be_bytes()[1..].to_vec();
        bytes.put(Bytes::from(cumulative_packet_lost_frame));
        bytes.put_u32(self.ext_highest_sequence);
        bytes.put_u32(self.jitter);
        bytes.put_u32(self.lsr);
        bytes.put_u32(self.dlsr);
        Ok(bytes.freeze())
    }
}

impl Unmarshall for ReportBlock {
    fn unmarshall(bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        if bytes.len() < 24 {
            return Err(UnmarshallError::InvalidLength);
        }
        let ssrc = (&bytes[0..4]).read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let fraction_lost = bytes[4];
        let cumulative_packets_lost = ((bytes[5] as u32) << 16) | ((bytes[6] as u32) << 8) | (bytes[7] as u32);
        let mut reader = bytes.slice(8..24).reader();
        let ext_highest_sequence = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let jitter = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let lsr = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let dlsr = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;

        Ok(ReportBlock {
            ssrc,
            fraction_lost,
            cumulative_packets_lost,
            ext_highest_sequence,
            jitter,
            lsr,
            dlsr,
        })
    }
}

#[cfg(test)]
mod receiver_report_new_constructor {
    use crate::header::{Header, PayloadType};
    use crate::receiver_report::{ReceiverReport, ReportBlock};

    #[test]
    fn one_block_receiver_report() {
        let actual_output = ReceiverReport::new(1, vec![ReportBlock {
            lsr: 0,
            ssrc: 2,
            dlsr: 0,
            fraction_lost: 10,
            jitter: 0,
            cumulative_packets_lost: 2,
            ext_highest_sequence: 15,
        }]);

        let expected_output = ReceiverReport {
            header: Header {
                padding: false,
                length: 7,
                payload_type: PayloadType::ReceiverReport,
                feedback_message_type: 1,
            },
            sender_ssrc: 1,
            reports: vec![ReportBlock {
                lsr: 0,
                ssrc: 2,
                dlsr: 0,
                fraction_lost: 10,
                jitter: 0,
                cumulative_packets_lost: 2,
                ext_highest_sequence: 15,
            }],
        };

        assert_eq!(actual_output, expected_output)
    }
}
