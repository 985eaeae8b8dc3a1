/// Capability seam onto an external H.264 encoder. Concrete media capture
/// and encoding is out of scope for this engine (section 1); the core only
/// ever commands a target bitrate and requests an IDR, per section 5's
/// "encoder bitrate is a single atomic `u32`" ownership split.
pub trait Encoder: Send {
    /// Latches a new target bitrate, bytes per second. Never blocks.
    fn set_bitrate(&mut self, bitrate: u32);

    /// Requests the next encoded frame be an IDR (independently decodable).
    fn force_idr(&mut self);

    fn current_bitrate(&self) -> u32;
}

/// Placeholder encoder for deployments with no encoder collaborator wired in
/// yet; records nothing, drops every command.
#[derive(Default)]
pub struct NoopEncoder {
    bitrate: u32,
}

impl Encoder for NoopEncoder {
    fn set_bitrate(&mut self, bitrate: u32) {
        self.bitrate = bitrate;
    }

    fn force_idr(&mut self) {}

    fn current_bitrate(&self) -> u32 {
        self.bitrate
    }
}
