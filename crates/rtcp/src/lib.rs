mod header;
mod transport_layer_feedback;
mod payload_specific_feedback;
mod sender_report;
mod receiver_report;
mod sdes;
mod bye;
mod app;
mod rtcp;
mod compound;

pub use payload_specific_feedback::{FirEntry, FullIntraRequest, PayloadSpecificFeedback, PictureLossIndication};
pub use receiver_report::{ReceiverReport, ReportBlock};
pub use sender_report::{SenderInfo, SenderReport};
pub use sdes::{Chunk, CNameSDES, SourceDescriptor, SDES};
pub use bye::Bye;
pub use app::App;
pub use rtcp::RtcpPacket;
pub use transport_layer_feedback::{GenericNACK, TransportLayerNACK};
pub use compound::{compound_marshall, compound_unmarshall};

pub trait Marshall {
    fn marshall(self) -> Result<bytes::Bytes, MarshallError>
    where
        Self: Sized;
}

pub trait Unmarshall {
    fn unmarshall(bytes: bytes::Bytes) -> Result<Self, UnmarshallError>
    where
        Self: Sized;
}

#[derive(Debug, PartialEq)]
pub enum MarshallError {
    UnsupportedFormat,
    InvalidLength,
}

#[derive(Debug, PartialEq)]
pub enum UnmarshallError {
    UnexpectedFrame,
    InvalidLength,
}
