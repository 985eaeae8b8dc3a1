use wfdparams::ContentProtection;

use crate::error::HdcpError;

/// The HDCP content-protection handshake itself is out of scope (section 1):
/// it lives in an external library. This is the hook the core calls through
/// after M4 negotiates a protection scheme, passing the negotiated
/// version/port straight through.
pub trait HdcpHandshake: Send {
    fn enable(&mut self, protection: &ContentProtection) -> Result<(), HdcpError>;
    fn disable(&mut self);
}

/// A handshake implementation that always reports the key as missing,
/// suitable for deployments that never negotiate content protection.
#[derive(Default)]
pub struct NoHdcp;

impl HdcpHandshake for NoHdcp {
    fn enable(&mut self, _protection: &ContentProtection) -> Result<(), HdcpError> {
        Err(HdcpError::KeyMissing)
    }

    fn disable(&mut self) {}
}

#[cfg(test)]
mod hdcp {
    use wfdparams::ContentProtection;

    use super::{HdcpHandshake, NoHdcp};
    use crate::error::HdcpError;

    #[test]
    fn no_hdcp_always_reports_key_missing() {
        let mut hdcp = NoHdcp;

        let result = hdcp.enable(&ContentProtection::Hdcp2_0 { port: 8080 });

        assert_eq!(result, Err(HdcpError::KeyMissing));
    }
}
