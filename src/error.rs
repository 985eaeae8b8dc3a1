use std::fmt::{Display, Formatter};

/// Error taxonomy for a single WFD session, per the error handling design:
/// wire errors are absorbed locally, state-machine errors bubble up and close
/// the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    WireFormat(WireFormatError),
    ProtocolViolation(ProtocolViolationError),
    TransportFailure(TransportFailureError),
    ResourceExhaustion(ResourceExhaustionError),
    Hdcp(HdcpError),
    Timeout(TimeoutError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireFormatError {
    RtpInvalid,
    RtcpInvalid,
    WfdParamInvalid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolViolationError {
    MissingRequiredMethod,
    UnexpectedState,
    NegotiationMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportFailureError {
    ConnectTimeout,
    ReadError,
    WriteError,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceExhaustionError {
    SocketUnavailable,
    PortBindFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HdcpError {
    KeyMissing,
    ConnectFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimeoutError {
    KeepAlive,
    TeardownAck,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for SessionError {}

/// What the owner of a session is told when it stops running. No partial-session
/// states are exposed: a session either keeps going or emits exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Error(SessionError),
    Closed(CloseReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    Teardown,
    SsrcCollision,
    KeepAliveTimeout,
    PeerClosed,
}

impl From<TimeoutError> for SessionError {
    fn from(err: TimeoutError) -> Self {
        SessionError::Timeout(err)
    }
}

impl From<TransportFailureError> for SessionError {
    fn from(err: TransportFailureError) -> Self {
        SessionError::TransportFailure(err)
    }
}

impl From<ProtocolViolationError> for SessionError {
    fn from(err: ProtocolViolationError) -> Self {
        SessionError::ProtocolViolation(err)
    }
}
