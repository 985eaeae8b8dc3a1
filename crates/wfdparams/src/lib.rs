mod line_parsers;

pub use line_parsers::{
    AudioCodec, AudioCodecEntry, AudioCodecs, ClientRtpPorts, ContentProtection, DisplayEdid,
    PresentationUrl, ResolutionBitmaps, TriggerMethod, UibcCapability, VideoFormats, WfdParamError,
};
use line_parsers::WfdLine;

/// The parsed body of a GET_PARAMETER response or SET_PARAMETER request: zero or more
/// `wfd_key: value` lines, CRLF-separated. Unrecognized keys are kept out of the
/// structured fields but don't abort parsing, matching how a sink may send vendor
/// `wfd_vnd_*` extensions alongside the standard parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    pub audio_codecs: Option<AudioCodecs>,
    pub video_formats: Option<VideoFormats>,
    pub client_rtp_ports: Option<ClientRtpPorts>,
    pub content_protection: Option<ContentProtection>,
    pub display_edid: Option<DisplayEdid>,
    pub uibc_capability: Option<UibcCapability>,
    pub uibc_setting: Option<bool>,
    pub standby_resume_capability: Option<bool>,
    pub standby: Option<bool>,
    pub trigger_method: Option<TriggerMethod>,
    pub presentation_url: Option<PresentationUrl>,
    pub idr_request: bool,
}

impl ParameterSet {
    pub fn parse(body: &str) -> Result<Self, WfdParamError> {
        let mut set = ParameterSet::default();

        for raw_line in body.split("\r\n") {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            match WfdLine::try_from(line)? {
                WfdLine::AudioCodecs(v) => set.audio_codecs = Some(v),
                WfdLine::VideoFormats(v) => set.video_formats = Some(v),
                WfdLine::ClientRtpPorts(v) => set.client_rtp_ports = Some(v),
                WfdLine::ContentProtection(v) => set.content_protection = Some(v),
                WfdLine::DisplayEdid(v) => set.display_edid = Some(v),
                WfdLine::UibcCapability(v) => set.uibc_capability = Some(v),
                WfdLine::UibcSetting(v) => set.uibc_setting = Some(v),
                WfdLine::StandbyResumeCapability(v) => set.standby_resume_capability = Some(v),
                WfdLine::Standby(v) => set.standby = Some(v),
                WfdLine::TriggerMethod(v) => set.trigger_method = Some(v),
                WfdLine::PresentationUrl(v) => set.presentation_url = Some(v),
                WfdLine::IdrRequest => set.idr_request = true,
                WfdLine::Unrecognized => {}
            }
        }

        Ok(set)
    }

    pub fn to_body(&self) -> String {
        let mut lines = vec![];

        if let Some(v) = self.audio_codecs.clone() {
            lines.push(String::from(WfdLine::AudioCodecs(v)));
        }
        if let Some(v) = self.video_formats.clone() {
            lines.push(String::from(WfdLine::VideoFormats(v)));
        }
        if let Some(v) = self.client_rtp_ports.clone() {
            lines.push(String::from(WfdLine::ClientRtpPorts(v)));
        }
        if let Some(v) = self.content_protection.clone() {
            lines.push(String::from(WfdLine::ContentProtection(v)));
        }
        if let Some(v) = self.display_edid.clone() {
            lines.push(String::from(WfdLine::DisplayEdid(v)));
        }
        if let Some(v) = self.uibc_capability.clone() {
            lines.push(String::from(WfdLine::UibcCapability(v)));
        }
        if let Some(v) = self.uibc_setting {
            lines.push(String::from(WfdLine::UibcSetting(v)));
        }
        if let Some(v) = self.standby_resume_capability {
            lines.push(String::from(WfdLine::StandbyResumeCapability(v)));
        }
        if let Some(v) = self.standby {
            lines.push(String::from(WfdLine::Standby(v)));
        }
        if let Some(v) = self.trigger_method.clone() {
            lines.push(String::from(WfdLine::TriggerMethod(v)));
        }
        if let Some(v) = self.presentation_url.clone() {
            lines.push(String::from(WfdLine::PresentationUrl(v)));
        }
        if self.idr_request {
            lines.push(String::from(WfdLine::IdrRequest));
        }

        lines.join("\r\n")
    }
}

#[cfg(test)]
mod parameter_set_round_trip {
    use super::*;

    #[test]
    fn parses_m3_capability_response() {
        let body = "wfd_audio_codecs: LPCM 00000002 00\r\n\
wfd_video_formats: 00 0 01 02 00001FFF 00000FFF 00000FFF 00 0000 0000 00\r\n\
wfd_content_protection: none\r\n\
wfd_display_edid: none\r\n\
wfd_uibc_capability: input_category_list=GENERIC; generic_cap_list=Keyboard; hidc_cap_list=none; port=none\r\n\
wfd_standby_resume_capability: supported\r\n";

        let parsed = ParameterSet::parse(body).unwrap();

        assert!(parsed.audio_codecs.is_some());
        assert!(parsed.video_formats.is_some());
        assert_eq!(parsed.content_protection, Some(ContentProtection::None));
        assert_eq!(parsed.display_edid, Some(DisplayEdid::None));
        assert_eq!(parsed.standby_resume_capability, Some(true));
    }

    #[test]
    fn ignores_vendor_extensions() {
        let body = "wfd_vnd_foo_bar: 1\r\nwfd_standby: yes\r\n";
        let parsed = ParameterSet::parse(body).unwrap();
        assert_eq!(parsed.standby, Some(true));
    }

    #[test]
    fn round_trips_client_rtp_ports_request() {
        let mut set = ParameterSet::default();
        set.client_rtp_ports = Some(ClientRtpPorts::Udp { port0: 19000 });
        set.presentation_url = Some(PresentationUrl { url0: Some("rtsp://192.168.1.10/wfd1.0".to_string()), url1: None });

        let body = set.to_body();
        let reparsed = ParameterSet::parse(&body).unwrap();
        assert_eq!(reparsed.client_rtp_ports, set.client_rtp_ports);
        assert_eq!(reparsed.presentation_url, set.presentation_url);
    }

    #[test]
    fn idr_request_is_bare_trigger() {
        let body = "wfd_idr_request\r\n";
        let parsed = ParameterSet::parse(body).unwrap();
        assert!(parsed.idr_request);
    }
}
