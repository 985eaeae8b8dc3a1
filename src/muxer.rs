use bytes::Bytes;

/// Capability seam onto the external MPEG-TS muxer / RTP payloader. The core
/// consumes framed `RtpPacket` bytes from it and can ask it to re-emit
/// PAT/PMT after a transport switch (section 4.G step 5); it never builds
/// media payloads itself.
pub trait Muxer: Send {
    /// Pulls the next payloaded RTP packet ready to send, if any is queued.
    fn next_packet(&mut self) -> Option<Bytes>;

    /// Pushes a synthetic "request new segment" event so the muxer re-emits
    /// PAT/PMT on the next packet, used when resuming on a fresh transport.
    fn request_new_segment(&mut self);
}

/// Placeholder muxer for deployments with no muxer collaborator wired in yet;
/// never produces a packet.
#[derive(Default)]
pub struct NullMuxer;

impl Muxer for NullMuxer {
    fn next_packet(&mut self) -> Option<Bytes> {
        None
    }

    fn request_new_segment(&mut self) {}
}
