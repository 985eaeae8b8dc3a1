use wfdparams::{AudioCodecEntry, ClientRtpPorts, ContentProtection, DisplayEdid, ParameterSet};

use crate::error::{ProtocolViolationError, SessionError};

use super::resolution::{mask_unsupported_by_edid, select_resolution, VideoMode};

/// The singular selections M4 commits to, derived from the sink's M3
/// capability response intersected with our own supported set.
#[derive(Debug, Clone)]
pub struct NegotiatedParams {
    pub audio: AudioCodecEntry,
    pub video_bit: u8,
    pub video_mode: VideoMode,
    pub video_profile: u8,
    pub video_level: u8,
    pub rtp_ports: ClientRtpPorts,
    pub hdcp: Option<ContentProtection>,
    pub uibc_enabled: bool,
}

/// What we advertise as supported, going into the negotiation; distinct from
/// a sink's `ParameterSet` because we always offer exactly one audio codec
/// family at a time rather than a sink's menu of several.
pub struct OurCapabilities {
    pub audio_codecs: Vec<AudioCodecEntry>,
    pub cea_support: u32,
    pub hdcp_port: Option<u16>,
    pub uibc_supported: bool,
}

/// Performs the M4 selection: one audio codec, one resolution (EDID-masked,
/// MSB-first scan), the sink's requested RTP ports, and HDCP/UIBC flags
/// carried through only if both sides offered them.
pub fn negotiate(ours: &OurCapabilities, sink: &ParameterSet) -> Result<NegotiatedParams, SessionError> {
    let sink_audio = sink.audio_codecs.as_ref().ok_or(SessionError::ProtocolViolation(ProtocolViolationError::NegotiationMismatch))?;
    let audio = ours
        .audio_codecs
        .iter()
        .find(|candidate| sink_audio.entries.iter().any(|e| e.codec == candidate.codec))
        .cloned()
        .ok_or(SessionError::ProtocolViolation(ProtocolViolationError::NegotiationMismatch))?;

    let sink_video =
        sink.video_formats.as_ref().ok_or(SessionError::ProtocolViolation(ProtocolViolationError::NegotiationMismatch))?;

    let mut cea_support = ours.cea_support;
    if let Some(DisplayEdid::Present { payload, .. }) = &sink.display_edid {
        if let Some((native_width, native_height)) = native_dimensions_from_edid(payload) {
            cea_support = mask_unsupported_by_edid(cea_support, native_width, native_height);
        }
    }

    let (video_bit, video_mode) = select_resolution(cea_support, sink_video.resolutions)
        .ok_or(SessionError::ProtocolViolation(ProtocolViolationError::NegotiationMismatch))?;

    let rtp_ports = sink
        .client_rtp_ports
        .clone()
        .ok_or(SessionError::ProtocolViolation(ProtocolViolationError::NegotiationMismatch))?;

    let hdcp = match (&sink.content_protection, ours.hdcp_port) {
        (Some(ContentProtection::Hdcp2_0 { .. }), Some(port)) => Some(ContentProtection::Hdcp2_0 { port }),
        (Some(ContentProtection::Hdcp2_1 { .. }), Some(port)) => Some(ContentProtection::Hdcp2_1 { port }),
        _ => None,
    };

    let uibc_enabled = ours.uibc_supported && sink.uibc_capability.is_some();

    Ok(NegotiatedParams {
        audio,
        video_bit,
        video_mode,
        video_profile: sink_video.profile,
        video_level: sink_video.level,
        rtp_ports,
        hdcp,
        uibc_enabled,
    })
}

/// WFD EDID blocks carry native width/height in the detailed timing
/// descriptor at byte offset 54 of the base block; bytes 0x3A/0x3B hold the
/// low byte of horizontal/vertical active pixels respectively. A full EDID
/// parser is out of scope; this extracts just enough for the M4 masking
/// rule.
fn native_dimensions_from_edid(payload: &[u8]) -> Option<(u16, u16)> {
    if payload.len() < 0x4A {
        return None;
    }
    let h_active = payload[0x38] as u16 | (((payload[0x3A] as u16) & 0xF0) << 4);
    let v_active = payload[0x3B] as u16 | (((payload[0x3D] as u16) & 0xF0) << 4);
    if h_active == 0 || v_active == 0 {
        None
    } else {
        Some((h_active, v_active))
    }
}

#[cfg(test)]
mod negotiate {
    use wfdparams::{AudioCodec, AudioCodecEntry, AudioCodecs, ClientRtpPorts, ParameterSet, ResolutionBitmaps, VideoFormats};

    use super::{negotiate, OurCapabilities};

    fn ours() -> OurCapabilities {
        OurCapabilities {
            audio_codecs: vec![AudioCodecEntry { codec: AudioCodec::Aac, mode_bitmap: 0x02, latency: 0 }],
            cea_support: 1 << 5,
            hdcp_port: None,
            uibc_supported: false,
        }
    }

    fn sink_with_caps() -> ParameterSet {
        let mut set = ParameterSet::default();
        set.audio_codecs = Some(AudioCodecs { entries: vec![AudioCodecEntry { codec: AudioCodec::Aac, mode_bitmap: 0x02, latency: 0 }] });
        set.video_formats = Some(VideoFormats {
            native_index: 0,
            preferred_display_mode_supported: false,
            profile: 1,
            level: 0x10,
            resolutions: ResolutionBitmaps { cea_support: 1 << 5, vesa_support: 0, hh_support: 0 },
            latency: 0,
            min_slice_size: 0,
            slice_enc_params: 0,
            frame_rate_control_support: 0,
        });
        set.client_rtp_ports = Some(ClientRtpPorts::Udp { port0: 50000 });
        set
    }

    #[test]
    fn picks_common_audio_codec_and_resolution() {
        let negotiated = negotiate(&ours(), &sink_with_caps()).unwrap();

        assert_eq!(negotiated.video_bit, 5);
        assert_eq!((negotiated.video_mode.width, negotiated.video_mode.height), (1280, 720));
        assert_eq!(negotiated.rtp_ports, ClientRtpPorts::Udp { port0: 50000 });
    }

    #[test]
    fn fails_when_sink_never_sent_video_formats() {
        let mut sink = sink_with_caps();
        sink.video_formats = None;

        assert!(negotiate(&ours(), &sink).is_err());
    }
}
