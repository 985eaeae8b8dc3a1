use byteorder::{BigEndian, ReadBytesExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::{Marshall, MarshallError, Unmarshall, UnmarshallError};
use crate::header::{Header, PayloadType};

#[derive(Debug, PartialEq)]
pub enum PayloadSpecificFeedback {
    PictureLossIndication(PictureLossIndication),
    FullIntraRequest(FullIntraRequest),
}

impl PictureLossIndication {
    pub fn new(sender_ssrc: u32, media_ssrc: u32) -> Self {
        let header = Header {
            length: 2,
            padding: false,
            feedback_message_type: 1,
            payload_type: PayloadType::PayloadSpecificFeedbackMessage,
        };

        Self {
            sender_ssrc,
            media_ssrc,
            header,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct PictureLossIndication {
    pub(crate) sender_ssrc: u32,
    pub(crate) media_ssrc: u32,
    pub(crate) header: Header,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FirEntry {
    pub ssrc: u32,
    pub seq_nr: u8,
}

#[derive(Debug, PartialEq)]
pub struct FullIntraRequest {
    pub(crate) sender_ssrc: u32,
    pub(crate) media_ssrc: u32,
    pub(crate) header: Header,
    pub entries: Vec<FirEntry>,
}

impl FullIntraRequest {
    pub fn new(sender_ssrc: u32, media_ssrc: u32, entries: Vec<FirEntry>) -> Self {
        let header = Header {
            length: 2 + entries.len() as u16 * 2,
            padding: false,
            feedback_message_type: 4,
            payload_type: PayloadType::PayloadSpecificFeedbackMessage,
        };

        Self { sender_ssrc, media_ssrc, header, entries }
    }
}

impl Unmarshall for PayloadSpecificFeedback {
    fn unmarshall(bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        let header = Header::unmarshall(bytes.clone())?;
        match &header.feedback_message_type {
            1 => Ok(PayloadSpecificFeedback::PictureLossIndication(PictureLossIndication::unmarshall(bytes)?)),
            4 => Ok(PayloadSpecificFeedback::FullIntraRequest(FullIntraRequest::unmarshall(bytes)?)),
            _ => return Err(UnmarshallError::UnexpectedFrame)
        }
    }
}


impl Unmarshall for PictureLossIndication {
    fn unmarshall(bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        let header = Header::unmarshall(bytes.clone())?;
        if header.length != PLI_LENGTH {
            return Err(UnmarshallError::UnexpectedFrame);
        }

        let mut reader = bytes.into_iter().skip(4).collect::<Bytes>().reader();
        let sender_ssrc = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::InvalidLength))?;
        let media_ssrc = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::InvalidLength))?;

        Ok(PictureLossIndication {
            media_ssrc,
            sender_ssrc,
            header,
        })
    }
}

impl Unmarshall for FullIntraRequest {
    fn unmarshall(bytes: Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized,
    {
        let header = Header::unmarshall(bytes.clone())?;
        let body_len = crate::header::words_to_bytes(header.length).saturating_sub(8);
        if bytes.len() < 8 + body_len || body_len % 8 != 0 {
            return Err(UnmarshallError::InvalidLength);
        }

        let mut reader = bytes.slice(4..8).reader();
        let sender_ssrc = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
        let media_ssrc = reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;

        let mut entries = vec![];
        let mut offset = 8;
        while offset < 8 + body_len {
            let mut entry_reader = bytes.slice(offset..offset + 8).reader();
            let ssrc = entry_reader.read_u32::<BigEndian>().or(Err(UnmarshallError::UnexpectedFrame))?;
            let seq_nr = entry_reader.read_u8().or(Err(UnmarshallError::UnexpectedFrame))?;
            entries.push(FirEntry { ssrc, seq_nr });
            offset += 8;
        }

        Ok(FullIntraRequest { sender_ssrc, media_ssrc, header, entries })
    }
}

impl Marshall for PayloadSpecificFeedback {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        match self {
            PayloadSpecificFeedback::PictureLossIndication(pli) => pli.marshall(),
            PayloadSpecificFeedback::FullIntraRequest(fir) => fir.marshall(),
        }
    }
}

impl Marshall for FullIntraRequest {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        let mut bytes = BytesMut::new();
        bytes.put(self.header.marshall()?);
        bytes.put_u32(self.sender_ssrc);
        bytes.put_u32(self.media_ssrc);
        for entry in self.entries {
            bytes.put_u32(entry.ssrc);
            bytes.put_u8(entry.seq_nr);
            bytes.put_bytes(0, 3);
        }
        Ok(bytes.freeze())
    }
}

impl Marshall for PictureLossIndication {
    fn marshall(self) -> Result<Bytes, MarshallError>
    where
        Self: Sized,
    {
        let mut bytes = BytesMut::new();
        let header = Header::marshall(self.header)?;
        bytes.put(header);
        bytes.put_u32(self.sender_ssrc);
        bytes.put_u32(self.media_ssrc);

        Ok(bytes.freeze())
    }
}


#[cfg(test)]
mod unmarshall_tests {
    use crate::header::PayloadType;
    use super::*;


    #[test]
    fn pls_fb_ok() {
        let bytes = Bytes::from_static(&
        [129, 206, 0, 2, // Payload Specific Feedback Header
            0, 0, 0, 1, // Sender ssrc = 1
            0, 0, 0, 2, // Media ssrc = 2
        ]);
        let pls_fb = PayloadSpecificFeedback::unmarshall(bytes).unwrap();

        assert_eq!(pls_fb, PayloadSpecificFeedback::PictureLossIndication(PictureLossIndication {
            media_ssrc: 2,
            sender_ssrc: 1,
            header: Header {
                payload_type: PayloadType::PayloadSpecificFeedbackMessage,
                length: 2,
                feedback_message_type: 1,
                padding: false,
            },
        }))
    }

    #[test]
    fn pls_fb_invalid_length() {
        let bytes = Bytes::from_static(&
        [129, 206, 0, 3, // Payload Specific Feedback Header
            0, 0, 0, 1, // Sender ssrc = 1
            0, 0, 0, 2, // Media ssrc = 2
        ]);
        let pls_fb = PayloadSpecificFeedback::unmarshall(bytes);

        assert_eq!(pls_fb.unwrap_err(), UnmarshallError::UnexpectedFrame)
    }
}

#[cfg(test)]
mod fir_round_trip {
    use crate::payload_specific_feedback::{FirEntry, FullIntraRequest, PayloadSpecificFeedback};
    use crate::{Marshall, Unmarshall};

    #[test]
    fn round_trips_with_one_entry() {
        let fir = PayloadSpecificFeedback::FullIntraRequest(FullIntraRequest::new(
            1,
            2,
            vec![FirEntry { ssrc: 2, seq_nr: 5 }],
        ));

        let bytes = fir.marshall().unwrap();
        let parsed = PayloadSpecificFeedback::unmarshall(bytes).unwrap();
        assert_eq!(parsed, PayloadSpecificFeedback::FullIntraRequest(FullIntraRequest::new(
            1,
            2,
            vec![FirEntry { ssrc: 2, seq_nr: 5 }],
        )));
    }
}

static PLI_LENGTH: u16 = 2;