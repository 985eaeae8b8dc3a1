mod negotiation;
mod resolution;

pub use negotiation::{negotiate, NegotiatedParams, OurCapabilities};
pub use resolution::{mode_for_bit, select_resolution, VideoMode};

use std::time::Duration;

use rand::random;
use wfdparams::{ClientRtpPorts, ParameterSet, TriggerMethod};

use crate::error::{ProtocolViolationError, SessionError};
use crate::rtsp::{Method, RtspRequest, RtspResponse};

/// The M1-M16 session lifecycle states from section 4.F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    Configured,
    Setup,
    Playing,
    Paused,
    Standby,
    TeardownPending,
    Closed,
}

pub struct WfdSessionConfig {
    pub capabilities: OurCapabilities,
    pub session_timeout: Duration,
}

/// Drives one sink's WFD control-plane state machine. Pure with respect to
/// I/O: callers feed it received requests/responses and get back the next
/// message (if any) to send plus the resulting state, matching the
/// single-writer I/O loop model from section 5.
pub struct WfdSession {
    pub state: SessionState,
    capabilities: OurCapabilities,
    session_timeout: Duration,
    cseq: u32,

    session_id: Option<String>,
    sink_caps: Option<ParameterSet>,
    pub negotiated: Option<NegotiatedParams>,
}

impl WfdSession {
    pub fn new(config: WfdSessionConfig) -> Self {
        Self {
            state: SessionState::Negotiating,
            capabilities: config.capabilities,
            session_timeout: config.session_timeout,
            cseq: 0,
            session_id: None,
            sink_caps: None,
            negotiated: None,
        }
    }

    fn next_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    /// M1: the source-initiated OPTIONS probe.
    pub fn build_m1_options(&mut self) -> RtspRequest {
        let mut req = RtspRequest::new(Method::Options, "*", self.next_cseq());
        req.headers.insert("Require", "org.wfa.wfd1.0");
        req
    }

    pub fn handle_m1_response(&self, response: &RtspResponse) -> Result<(), SessionError> {
        let public = response
            .headers
            .get("Public")
            .ok_or(SessionError::ProtocolViolation(ProtocolViolationError::MissingRequiredMethod))?;
        let has = |method: &str| public.split(',').map(str::trim).any(|m| m == method);
        if !has("SET_PARAMETER") || !has("GET_PARAMETER") {
            return Err(SessionError::ProtocolViolation(ProtocolViolationError::MissingRequiredMethod));
        }
        Ok(())
    }

    /// M2: replying to the sink's symmetric OPTIONS with our own method list.
    pub fn build_m2_response(&self, request: &RtspRequest) -> RtspResponse {
        let mut response = RtspResponse::ok(request.cseq);
        response.headers.insert("Public", "OPTIONS, SET_PARAMETER, GET_PARAMETER");
        response
    }

    /// M3: request the sink's capabilities.
    pub fn build_m3_request(&mut self) -> RtspRequest {
        let body = "wfd_audio_codecs\r\n\
wfd_video_formats\r\n\
wfd_client_rtp_ports\r\n\
wfd_display_edid\r\n\
wfd_content_protection\r\n\
wfd_uibc_capability\r\n\
wfd_standby_resume_capability\r\n";
        RtspRequest::new(Method::GetParameter, "rtsp://localhost/wfd1.0", self.next_cseq()).with_body(body)
    }

    pub fn handle_m3_response(&mut self, response: &RtspResponse) -> Result<(), SessionError> {
        let body = response
            .body
            .as_deref()
            .ok_or(SessionError::WireFormat(crate::error::WireFormatError::WfdParamInvalid))?;
        let parsed = ParameterSet::parse(body).map_err(|_| SessionError::WireFormat(crate::error::WireFormatError::WfdParamInvalid))?;
        self.sink_caps = Some(parsed);
        Ok(())
    }

    /// Runs the M4 selection against the stored M3 response.
    pub fn negotiate(&mut self) -> Result<(), SessionError> {
        let sink_caps = self
            .sink_caps
            .as_ref()
            .ok_or(SessionError::ProtocolViolation(ProtocolViolationError::UnexpectedState))?;
        let negotiated = negotiation::negotiate(&self.capabilities, sink_caps)?;
        self.negotiated = Some(negotiated);
        Ok(())
    }

    /// M4: commits the singular selections computed by `negotiate`.
    pub fn build_m4_request(&mut self) -> Result<RtspRequest, SessionError> {
        let negotiated = self.negotiated.clone().ok_or(SessionError::ProtocolViolation(ProtocolViolationError::UnexpectedState))?;

        let mut set = ParameterSet::default();
        set.audio_codecs = Some(wfdparams::AudioCodecs { entries: vec![negotiated.audio.clone()] });
        set.video_formats = Some(wfdparams::VideoFormats {
            native_index: negotiated.video_bit,
            preferred_display_mode_supported: false,
            profile: negotiated.video_profile,
            level: negotiated.video_level,
            resolutions: wfdparams::ResolutionBitmaps {
                cea_support: 1 << negotiated.video_bit,
                vesa_support: 0,
                hh_support: 0,
            },
            latency: 0,
            min_slice_size: 0,
            slice_enc_params: 0,
            frame_rate_control_support: 0,
        });
        set.client_rtp_ports = Some(negotiated.rtp_ports.clone());
        if let Some(hdcp) = negotiated.hdcp.clone() {
            set.content_protection = Some(hdcp);
        }
        if negotiated.uibc_enabled {
            set.uibc_setting = Some(true);
        }

        Ok(RtspRequest::new(Method::SetParameter, "rtsp://localhost/wfd1.0", self.next_cseq()).with_body(set.to_body()))
    }

    /// M5: hands control to the sink to initiate SETUP.
    pub fn build_m5_trigger_setup(&mut self) -> RtspRequest {
        let mut set = ParameterSet::default();
        set.trigger_method = Some(TriggerMethod::Setup);
        let req = RtspRequest::new(Method::SetParameter, "rtsp://localhost/wfd1.0", self.next_cseq()).with_body(set.to_body());
        self.state = SessionState::Configured;
        req
    }

    /// M6: the sink's SETUP. Assigns the session id and echoes the chosen
    /// transport.
    pub fn handle_setup_request(&mut self, request: &RtspRequest) -> Result<RtspResponse, SessionError> {
        if self.state != SessionState::Configured {
            return Err(SessionError::ProtocolViolation(ProtocolViolationError::UnexpectedState));
        }
        let session_id = format!("{:016x}", random::<u64>());
        self.session_id = Some(session_id.clone());

        let transport = request.headers.get("Transport").unwrap_or("RTP/AVP/UDP;unicast").to_string();

        let mut response = RtspResponse::ok(request.cseq);
        response.headers.insert("Session", format!("{session_id}; timeout={}", self.session_timeout.as_secs()));
        response.headers.insert("Transport", transport);
        self.state = SessionState::Setup;
        Ok(response)
    }

    /// M7: the sink's PLAY. Starts the pipeline and bitrate controller
    /// (owned by the caller; this only records the state transition).
    pub fn handle_play_request(&mut self, request: &RtspRequest) -> Result<RtspResponse, SessionError> {
        if !matches!(self.state, SessionState::Setup | SessionState::Paused) {
            return Err(SessionError::ProtocolViolation(ProtocolViolationError::UnexpectedState));
        }
        self.state = SessionState::Playing;
        Ok(self.session_response(request.cseq))
    }

    /// M9: the sink's PAUSE.
    pub fn handle_pause_request(&mut self, request: &RtspRequest) -> Result<RtspResponse, SessionError> {
        if self.state != SessionState::Playing {
            return Err(SessionError::ProtocolViolation(ProtocolViolationError::UnexpectedState));
        }
        self.state = SessionState::Paused;
        Ok(self.session_response(request.cseq))
    }

    /// M8: the sink's TEARDOWN.
    pub fn handle_teardown_request(&mut self, request: &RtspRequest) -> RtspResponse {
        self.state = SessionState::Closed;
        self.session_response(request.cseq)
    }

    /// M12: standby toggling, either direction.
    pub fn build_standby_request(&mut self, on: bool) -> RtspRequest {
        let mut set = ParameterSet::default();
        set.standby = Some(on);
        self.state = if on { SessionState::Standby } else { SessionState::Playing };
        RtspRequest::new(Method::SetParameter, "rtsp://localhost/wfd1.0", self.next_cseq()).with_body(set.to_body())
    }

    pub fn handle_standby_request(&mut self, request: &RtspRequest, on: bool) -> RtspResponse {
        self.state = if on { SessionState::Standby } else { SessionState::Playing };
        self.session_response(request.cseq)
    }

    /// M13: request an IDR from the encoder; doesn't change session state.
    pub fn build_idr_request(&mut self) -> RtspRequest {
        let mut set = ParameterSet::default();
        set.idr_request = true;
        RtspRequest::new(Method::SetParameter, "rtsp://localhost/wfd1.0", self.next_cseq()).with_body(set.to_body())
    }

    /// Begins the TEARDOWN trigger. The caller is responsible for the 200 ms
    /// grace-period timeout described in section 4.F.
    pub fn build_teardown_trigger(&mut self) -> RtspRequest {
        let mut set = ParameterSet::default();
        set.trigger_method = Some(TriggerMethod::Teardown);
        self.state = SessionState::TeardownPending;
        RtspRequest::new(Method::SetParameter, "rtsp://localhost/wfd1.0", self.next_cseq()).with_body(set.to_body())
    }

    /// The 200 ms grace-period expiry with no sink TEARDOWN: close
    /// unconditionally.
    pub fn force_close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// M16: periodic keep-alive probe, sent every `timeout - 5` s by the
    /// keep-alive watchdog.
    pub fn build_keepalive_request(&mut self) -> RtspRequest {
        RtspRequest::new(Method::GetParameter, "rtsp://localhost/wfd1.0", self.next_cseq())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn rtp_ports(&self) -> Option<&ClientRtpPorts> {
        self.negotiated.as_ref().map(|n| &n.rtp_ports)
    }

    fn session_response(&self, cseq: u32) -> RtspResponse {
        let mut response = RtspResponse::ok(cseq);
        if let Some(id) = &self.session_id {
            response.headers.insert("Session", id.clone());
        }
        response
    }
}

#[cfg(test)]
mod wfd_session {
    use std::time::Duration;

    use wfdparams::{AudioCodec, AudioCodecEntry, AudioCodecs, ClientRtpPorts, ResolutionBitmaps, VideoFormats};

    use crate::rtsp::{Method, RtspRequest, RtspResponse};

    use super::{OurCapabilities, SessionState, WfdSession, WfdSessionConfig};

    fn session() -> WfdSession {
        WfdSession::new(WfdSessionConfig {
            capabilities: OurCapabilities {
                audio_codecs: vec![AudioCodecEntry { codec: AudioCodec::Aac, mode_bitmap: 0x02, latency: 0 }],
                cea_support: 1 << 5,
                hdcp_port: None,
                uibc_supported: false,
            },
            session_timeout: Duration::from_secs(60),
        })
    }

    #[test]
    fn m1_response_missing_public_header_is_rejected() {
        let session = session();
        let response = RtspResponse::ok(1);

        assert!(session.handle_m1_response(&response).is_err());
    }

    #[test]
    fn m1_response_with_required_methods_is_accepted() {
        let session = session();
        let mut response = RtspResponse::ok(1);
        response.headers.insert("Public", "OPTIONS, SET_PARAMETER, GET_PARAMETER");

        assert!(session.handle_m1_response(&response).is_ok());
    }

    #[test]
    fn full_negotiation_then_setup_then_play_sequence() {
        let mut session = session();

        let mut sink_body = String::new();
        sink_body.push_str(&String::from(AudioCodecs { entries: vec![AudioCodecEntry { codec: AudioCodec::Aac, mode_bitmap: 0x02, latency: 0 }] }));
        let m3_response = RtspResponse::ok(2).with_body(format!(
            "wfd_audio_codecs: AAC 00000002 00\r\nwfd_video_formats: 00 0 01 10 00000020 00000000 00000000 00 0000 0000 00\r\nwfd_client_rtp_ports: RTP/AVP/UDP;unicast 50000 0 mode=play\r\n"
        ));
        let _ = sink_body;

        session.handle_m3_response(&m3_response).unwrap();
        session.negotiate().unwrap();
        assert_eq!(session.rtp_ports(), Some(&ClientRtpPorts::Udp { port0: 50000 }));

        session.build_m4_request().unwrap();
        session.build_m5_trigger_setup();
        assert_eq!(session.state, SessionState::Configured);

        let setup_req = RtspRequest::new(Method::Setup, "rtsp://localhost/wfd1.0/streamid=0", 10);
        let setup_resp = session.handle_setup_request(&setup_req).unwrap();
        assert_eq!(session.state, SessionState::Setup);
        assert!(setup_resp.headers.get("Session").unwrap().contains("timeout=60"));

        let play_req = RtspRequest::new(Method::Play, "rtsp://localhost/wfd1.0/streamid=0", 11);
        session.handle_play_request(&play_req).unwrap();
        assert_eq!(session.state, SessionState::Playing);
    }

    #[test]
    fn teardown_transitions_to_closed() {
        let mut session = session();
        session.state = SessionState::Playing;
        let req = RtspRequest::new(Method::Teardown, "rtsp://localhost/wfd1.0", 20);

        session.handle_teardown_request(&req);

        assert_eq!(session.state, SessionState::Closed);
    }

    #[test]
    fn play_before_setup_is_rejected() {
        let mut session = session();
        let req = RtspRequest::new(Method::Play, "rtsp://localhost/wfd1.0", 1);

        assert!(session.handle_play_request(&req).is_err());
    }
}
