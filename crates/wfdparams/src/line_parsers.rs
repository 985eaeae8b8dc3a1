use std::str::FromStr;

use crate::WfdParamError::MalformedParameter;

#[derive(Debug, PartialEq)]
pub enum WfdParamError {
    MalformedLine,
    MalformedParameter,
    UnsupportedCodec,
    InvalidBitmap,
    InvalidPort,
    UnrecognizedTrigger,
}

/// One `wfd_key: value` line from a GET_PARAMETER/SET_PARAMETER body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WfdLine {
    AudioCodecs(AudioCodecs),
    VideoFormats(VideoFormats),
    ClientRtpPorts(ClientRtpPorts),
    ContentProtection(ContentProtection),
    DisplayEdid(DisplayEdid),
    UibcCapability(UibcCapability),
    UibcSetting(bool),
    StandbyResumeCapability(bool),
    Standby(bool),
    TriggerMethod(TriggerMethod),
    PresentationUrl(PresentationUrl),
    IdrRequest,
    Unrecognized,
}

impl TryFrom<&str> for WfdLine {
    type Error = WfdParamError;

    fn try_from(input: &str) -> Result<Self, Self::Error> {
        let (key, value) = input.split_once(':').unwrap_or((input, ""));
        let key = key.trim();
        let value = value.trim();

        match key {
            "wfd_audio_codecs" => Ok(WfdLine::AudioCodecs(AudioCodecs::try_from(value)?)),
            "wfd_video_formats" => Ok(WfdLine::VideoFormats(VideoFormats::try_from(value)?)),
            "wfd_client_rtp_ports" => Ok(WfdLine::ClientRtpPorts(ClientRtpPorts::try_from(value)?)),
            "wfd_content_protection" => Ok(WfdLine::ContentProtection(ContentProtection::try_from(value)?)),
            "wfd_display_edid" => Ok(WfdLine::DisplayEdid(DisplayEdid::try_from(value)?)),
            "wfd_uibc_capability" => Ok(WfdLine::UibcCapability(UibcCapability::try_from(value)?)),
            "wfd_uibc_setting" => Ok(WfdLine::UibcSetting(parse_yes_no(value)?)),
            "wfd_standby_resume_capability" => Ok(WfdLine::StandbyResumeCapability(value.eq_ignore_ascii_case("supported"))),
            "wfd_standby" => Ok(WfdLine::Standby(parse_yes_no(value)?)),
            "wfd_trigger_method" => Ok(WfdLine::TriggerMethod(TriggerMethod::try_from(value)?)),
            "wfd_presentation_URL" => Ok(WfdLine::PresentationUrl(PresentationUrl::try_from(value)?)),
            "wfd_idr_request" => Ok(WfdLine::IdrRequest),
            _ => Ok(WfdLine::Unrecognized),
        }
    }
}

impl From<WfdLine> for String {
    fn from(value: WfdLine) -> Self {
        match value {
            WfdLine::AudioCodecs(v) => format!("wfd_audio_codecs: {}", String::from(v)),
            WfdLine::VideoFormats(v) => format!("wfd_video_formats: {}", String::from(v)),
            WfdLine::ClientRtpPorts(v) => format!("wfd_client_rtp_ports: {}", String::from(v)),
            WfdLine::ContentProtection(v) => format!("wfd_content_protection: {}", String::from(v)),
            WfdLine::DisplayEdid(v) => format!("wfd_display_edid: {}", String::from(v)),
            WfdLine::UibcCapability(v) => format!("wfd_uibc_capability: {}", String::from(v)),
            WfdLine::UibcSetting(enabled) => format!("wfd_uibc_setting: {}", yes_no(enabled)),
            WfdLine::StandbyResumeCapability(supported) => {
                format!("wfd_standby_resume_capability: {}", if supported { "supported" } else { "none" })
            }
            WfdLine::Standby(on) => format!("wfd_standby: {}", yes_no(on)),
            WfdLine::TriggerMethod(v) => format!("wfd_trigger_method: {}", String::from(v)),
            WfdLine::PresentationUrl(v) => format!("wfd_presentation_URL: {}", String::from(v)),
            WfdLine::IdrRequest => "wfd_idr_request".to_string(),
            WfdLine::Unrecognized => String::new(),
        }
    }
}

fn parse_yes_no(value: &str) -> Result<bool, WfdParamError> {
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(WfdParamError::MalformedParameter),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioCodec {
    Lpcm,
    Aac,
    Ac3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioCodecEntry {
    pub codec: AudioCodec,
    pub mode_bitmap: u32,
    pub latency: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioCodecs {
    pub entries: Vec<AudioCodecEntry>,
}

impl TryFrom<&str> for AudioCodecs {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let entries = value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(AudioCodecEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AudioCodecs { entries })
    }
}

impl From<AudioCodecs> for String {
    fn from(value: AudioCodecs) -> Self {
        value
            .entries
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl TryFrom<&str> for AudioCodecEntry {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut split = value.split_whitespace();
        let codec = match split.next().ok_or(MalformedParameter)? {
            "LPCM" => AudioCodec::Lpcm,
            "AAC" => AudioCodec::Aac,
            "AC3" => AudioCodec::Ac3,
            _ => return Err(WfdParamError::UnsupportedCodec),
        };
        let mode_bitmap = u32::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let latency = u8::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;

        Ok(AudioCodecEntry { codec, mode_bitmap, latency })
    }
}

impl From<AudioCodecEntry> for String {
    fn from(value: AudioCodecEntry) -> Self {
        let codec = match value.codec {
            AudioCodec::Lpcm => "LPCM",
            AudioCodec::Aac => "AAC",
            AudioCodec::Ac3 => "AC3",
        };
        format!("{} {:08X} {:02X}", codec, value.mode_bitmap, value.latency)
    }
}

/// Resolution support bitmasks. Per the source's own capability advertisement, only the
/// CEA table is ever selected from; VESA/HH bits pass through unopinionated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionBitmaps {
    pub cea_support: u32,
    pub vesa_support: u32,
    pub hh_support: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFormats {
    pub native_index: u8,
    pub preferred_display_mode_supported: bool,
    pub profile: u8,
    pub level: u8,
    pub resolutions: ResolutionBitmaps,
    pub latency: u8,
    pub min_slice_size: u16,
    pub slice_enc_params: u16,
    pub frame_rate_control_support: u8,
}

impl TryFrom<&str> for VideoFormats {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut split = value.split_whitespace();

        let native_index = u8::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let preferred_display_mode_supported = split.next().ok_or(MalformedParameter)? == "1";
        let profile = u8::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let level = u8::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let cea_support = u32::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let vesa_support = u32::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let hh_support = u32::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let latency = u8::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let min_slice_size = u16::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let slice_enc_params = u16::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;
        let frame_rate_control_support = u8::from_str_radix(split.next().ok_or(MalformedParameter)?, 16)
            .map_err(|_| WfdParamError::InvalidBitmap)?;

        Ok(VideoFormats {
            native_index,
            preferred_display_mode_supported,
            profile,
            level,
            resolutions: ResolutionBitmaps { cea_support, vesa_support, hh_support },
            latency,
            min_slice_size,
            slice_enc_params,
            frame_rate_control_support,
        })
    }
}

impl From<VideoFormats> for String {
    fn from(value: VideoFormats) -> Self {
        format!(
            "{:02X} {} {:02X} {:02X} {:08X} {:08X} {:08X} {:02X} {:04X} {:04X} {:02X}",
            value.native_index,
            if value.preferred_display_mode_supported { 1 } else { 0 },
            value.profile,
            value.level,
            value.resolutions.cea_support,
            value.resolutions.vesa_support,
            value.resolutions.hh_support,
            value.latency,
            value.min_slice_size,
            value.slice_enc_params,
            value.frame_rate_control_support,
        )
    }
}

/// `mode=play` is always implied; the source never negotiates record mode.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRtpPorts {
    Udp { port0: u16 },
    Tcp { ch0: u8, ch1: u8 },
}

impl TryFrom<&str> for ClientRtpPorts {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if let Some(rest) = value.strip_prefix("RTP/AVP/UDP;unicast ") {
            let mut split = rest.split_whitespace();
            let port0 = split.next().ok_or(MalformedParameter)?.parse::<u16>().map_err(|_| WfdParamError::InvalidPort)?;
            let port1 = split.next().ok_or(MalformedParameter)?.parse::<u16>().map_err(|_| WfdParamError::InvalidPort)?;
            if port1 != 0 {
                return Err(WfdParamError::InvalidPort);
            }
            Ok(ClientRtpPorts::Udp { port0 })
        } else if let Some(rest) = value.strip_prefix("RTP/AVP/TCP;interleaved ") {
            let mut split = rest.split_whitespace();
            let ch0 = split.next().ok_or(MalformedParameter)?.parse::<u8>().map_err(|_| WfdParamError::InvalidPort)?;
            let ch1 = split.next().ok_or(MalformedParameter)?.parse::<u8>().map_err(|_| WfdParamError::InvalidPort)?;
            Ok(ClientRtpPorts::Tcp { ch0, ch1 })
        } else {
            Err(MalformedParameter)
        }
    }
}

impl From<ClientRtpPorts> for String {
    fn from(value: ClientRtpPorts) -> Self {
        match value {
            ClientRtpPorts::Udp { port0 } => format!("RTP/AVP/UDP;unicast {} 0 mode=play", port0),
            ClientRtpPorts::Tcp { ch0, ch1 } => format!("RTP/AVP/TCP;interleaved {} {} mode=play", ch0, ch1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentProtection {
    None,
    Hdcp2_0 { port: u16 },
    Hdcp2_1 { port: u16 },
}

impl TryFrom<&str> for ContentProtection {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("none") {
            return Ok(ContentProtection::None);
        }
        let (version, rest) = value.split_once(' ').ok_or(MalformedParameter)?;
        let port = rest
            .strip_prefix("port=")
            .ok_or(MalformedParameter)?
            .parse::<u16>()
            .map_err(|_| WfdParamError::InvalidPort)?;

        match version {
            "HDCP2.0" => Ok(ContentProtection::Hdcp2_0 { port }),
            "HDCP2.1" => Ok(ContentProtection::Hdcp2_1 { port }),
            _ => Err(MalformedParameter),
        }
    }
}

impl From<ContentProtection> for String {
    fn from(value: ContentProtection) -> Self {
        match value {
            ContentProtection::None => "none".to_string(),
            ContentProtection::Hdcp2_0 { port } => format!("HDCP2.0 port={}", port),
            ContentProtection::Hdcp2_1 { port } => format!("HDCP2.1 port={}", port),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEdid {
    None,
    Present { block_count: u16, payload: Vec<u8> },
}

impl TryFrom<&str> for DisplayEdid {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("none") {
            return Ok(DisplayEdid::None);
        }
        let (block_count, hex) = value.split_once(' ').ok_or(MalformedParameter)?;
        let block_count = block_count.parse::<u16>().map_err(|_| MalformedParameter)?;
        let payload = decode_hex(hex)?;
        Ok(DisplayEdid::Present { block_count, payload })
    }
}

impl From<DisplayEdid> for String {
    fn from(value: DisplayEdid) -> Self {
        match value {
            DisplayEdid::None => "none".to_string(),
            DisplayEdid::Present { block_count, payload } => format!("{} {}", block_count, encode_hex(&payload)),
        }
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>, WfdParamError> {
    if value.len() % 2 != 0 {
        return Err(WfdParamError::MalformedLine);
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16).map_err(|_| WfdParamError::MalformedLine))
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct UibcCapability {
    pub input_categories: Vec<String>,
    pub generic_caps: Vec<String>,
    pub hidc_caps: Vec<String>,
    pub port: Option<u16>,
}

impl TryFrom<&str> for UibcCapability {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut input_categories = vec![];
        let mut generic_caps = vec![];
        let mut hidc_caps = vec![];
        let mut port = None;

        for field in value.split(';').map(str::trim).filter(|f| !f.is_empty()) {
            let (key, val) = field.split_once('=').ok_or(MalformedParameter)?;
            let list = || val.split(',').map(str::trim).map(ToString::to_string).collect::<Vec<_>>();
            match key.trim() {
                "input_category_list" => input_categories = list(),
                "generic_cap_list" => generic_caps = list(),
                "hidc_cap_list" => hidc_caps = list(),
                "port" => port = if val == "none" { None } else { Some(val.parse::<u16>().map_err(|_| WfdParamError::InvalidPort)?) },
                _ => {}
            }
        }

        Ok(UibcCapability { input_categories, generic_caps, hidc_caps, port })
    }
}

impl From<UibcCapability> for String {
    fn from(value: UibcCapability) -> Self {
        let port = value.port.map(|p| p.to_string()).unwrap_or_else(|| "none".to_string());
        format!(
            "input_category_list={}; generic_cap_list={}; hidc_cap_list={}; port={}",
            value.input_categories.join(", "),
            value.generic_caps.join(", "),
            value.hidc_caps.join(", "),
            port,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerMethod {
    Setup,
    Play,
    Pause,
    Teardown,
}

impl TryFrom<&str> for TriggerMethod {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "SETUP" => Ok(TriggerMethod::Setup),
            "PLAY" => Ok(TriggerMethod::Play),
            "PAUSE" => Ok(TriggerMethod::Pause),
            "TEARDOWN" => Ok(TriggerMethod::Teardown),
            _ => Err(WfdParamError::UnrecognizedTrigger),
        }
    }
}

impl From<TriggerMethod> for String {
    fn from(value: TriggerMethod) -> Self {
        match value {
            TriggerMethod::Setup => "SETUP".to_string(),
            TriggerMethod::Play => "PLAY".to_string(),
            TriggerMethod::Pause => "PAUSE".to_string(),
            TriggerMethod::Teardown => "TEARDOWN".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresentationUrl {
    pub url0: Option<String>,
    pub url1: Option<String>,
}

impl TryFrom<&str> for PresentationUrl {
    type Error = WfdParamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut split = value.split_whitespace();
        let url0 = split.next().ok_or(MalformedParameter)?;
        let url1 = split.next().ok_or(MalformedParameter)?;

        Ok(PresentationUrl {
            url0: (url0 != "none").then(|| url0.to_string()),
            url1: (url1 != "none").then(|| url1.to_string()),
        })
    }
}

impl From<PresentationUrl> for String {
    fn from(value: PresentationUrl) -> Self {
        format!(
            "{} {}",
            value.url0.unwrap_or_else(|| "none".to_string()),
            value.url1.unwrap_or_else(|| "none".to_string()),
        )
    }
}

impl FromStr for WfdLine {
    type Err = WfdParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WfdLine::try_from(s)
    }
}

#[cfg(test)]
mod parses_audio_codecs {
    use super::*;

    #[test]
    fn single_entry() {
        let parsed = AudioCodecs::try_from("LPCM 00000002 00").unwrap();
        assert_eq!(parsed, AudioCodecs {
            entries: vec![AudioCodecEntry { codec: AudioCodec::Lpcm, mode_bitmap: 2, latency: 0 }],
        });
    }

    #[test]
    fn multiple_entries_round_trip() {
        let line = "LPCM 00000002 00, AAC 00000001 00";
        let parsed = AudioCodecs::try_from(line).unwrap();
        assert_eq!(String::from(parsed), line);
    }

    #[test]
    fn rejects_unsupported_codec() {
        assert_eq!(AudioCodecEntry::try_from("MP3 1 0").unwrap_err(), WfdParamError::UnsupportedCodec);
    }
}

#[cfg(test)]
mod parses_video_formats {
    use super::*;

    #[test]
    fn round_trips() {
        let line = "00 0 01 02 00001FFF 00000FFF 00000FFF 00 0000 0000 00";
        let parsed = VideoFormats::try_from(line).unwrap();
        assert_eq!(String::from(parsed), line);
    }
}

#[cfg(test)]
mod parses_client_rtp_ports {
    use super::*;

    #[test]
    fn udp_mode() {
        let parsed = ClientRtpPorts::try_from("RTP/AVP/UDP;unicast 19000 0 mode=play").unwrap();
        assert_eq!(parsed, ClientRtpPorts::Udp { port0: 19000 });
    }

    #[test]
    fn tcp_mode() {
        let parsed = ClientRtpPorts::try_from("RTP/AVP/TCP;interleaved 0 1 mode=play").unwrap();
        assert_eq!(parsed, ClientRtpPorts::Tcp { ch0: 0, ch1: 1 });
    }

    #[test]
    fn rejects_nonzero_second_udp_port() {
        assert_eq!(
            ClientRtpPorts::try_from("RTP/AVP/UDP;unicast 19000 19001 mode=play").unwrap_err(),
            WfdParamError::InvalidPort
        );
    }
}

#[cfg(test)]
mod parses_content_protection {
    use super::*;

    #[test]
    fn none() {
        assert_eq!(ContentProtection::try_from("none").unwrap(), ContentProtection::None);
    }

    #[test]
    fn hdcp_round_trips() {
        let line = "HDCP2.1 port=8999";
        let parsed = ContentProtection::try_from(line).unwrap();
        assert_eq!(String::from(parsed), line);
    }
}

#[cfg(test)]
mod parses_display_edid {
    use super::*;

    #[test]
    fn none() {
        assert_eq!(DisplayEdid::try_from("none").unwrap(), DisplayEdid::None);
    }

    #[test]
    fn round_trips_payload() {
        let parsed = DisplayEdid::try_from("1 00ff00ff").unwrap();
        assert_eq!(parsed, DisplayEdid::Present { block_count: 1, payload: vec![0x00, 0xff, 0x00, 0xff] });
        assert_eq!(String::from(parsed), "1 00ff00ff");
    }
}

#[cfg(test)]
mod parses_uibc_capability {
    use super::*;

    #[test]
    fn parses_fields() {
        let line = "input_category_list=GENERIC, HIDC; generic_cap_list=Keyboard, Mouse; hidc_cap_list=Keyboard/USB; port=none";
        let parsed = UibcCapability::try_from(line).unwrap();
        assert_eq!(parsed.input_categories, vec!["GENERIC", "HIDC"]);
        assert_eq!(parsed.port, None);
    }
}



#[cfg(test)]
mod parses_wfd_line {
    use super::*;

    #[test]
    fn dispatches_on_key() {
        let line = WfdLine::try_from("wfd_standby: yes").unwrap();
        assert_eq!(line, WfdLine::Standby(true));
    }

    #[test]
    fn idr_request_has_no_body() {
        let line = WfdLine::try_from("wfd_idr_request: ").unwrap();
        assert_eq!(line, WfdLine::IdrRequest);
    }

    #[test]
    fn unrecognized_key_does_not_error() {
        let line = WfdLine::try_from("wfd_connector_type: 05").unwrap();
        assert_eq!(line, WfdLine::Unrecognized);
    }
}
