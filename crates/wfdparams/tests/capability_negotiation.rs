mod capability_negotiation {
    use wfdparams::{AudioCodec, ClientRtpPorts, ContentProtection, ParameterSet, TriggerMethod};

    const M3_RESPONSE_BODY: &str = "wfd_audio_codecs: LPCM 00000002 00, AAC 00000001 00\r\n\
wfd_video_formats: 00 0 01 02 00001FFF 00000FFF 00000FFF 00 0000 0000 00\r\n\
wfd_3d_video_formats: none\r\n\
wfd_content_protection: none\r\n\
wfd_display_edid: none\r\n\
wfd_coupled_sink: none\r\n\
wfd_client_rtp_ports: RTP/AVP/UDP;unicast 19000 0 mode=play\r\n\
wfd_uibc_capability: input_category_list=GENERIC; generic_cap_list=Keyboard, Mouse; hidc_cap_list=none; port=none\r\n\
wfd_uibc_setting: disable\r\n\
wfd_standby_resume_capability: supported\r\n\
wfd_connector_type: 05\r\n";

    #[test]
    fn parses_sink_capability_response() {
        let set = ParameterSet::parse(M3_RESPONSE_BODY).unwrap();

        let codecs = set.audio_codecs.expect("audio codecs should parse");
        assert_eq!(codecs.entries[0].codec, AudioCodec::Lpcm);
        assert_eq!(codecs.entries[1].codec, AudioCodec::Aac);

        assert_eq!(set.content_protection, Some(ContentProtection::None));
        assert_eq!(set.client_rtp_ports, Some(ClientRtpPorts::Udp { port0: 19000 }));
        assert_eq!(set.standby_resume_capability, Some(true));

        // unrecognized wfd_3d_video_formats / wfd_coupled_sink / wfd_connector_type lines
        // don't abort parsing of the rest of the body
        assert!(set.video_formats.is_some());
        assert!(set.uibc_capability.is_some());
    }

    #[test]
    fn builds_trigger_request_body() {
        let mut set = ParameterSet::default();
        set.trigger_method = Some(TriggerMethod::Setup);

        assert_eq!(set.to_body(), "wfd_trigger_method: SETUP");
    }

    #[test]
    fn rejects_malformed_audio_codec_entry() {
        let body = "wfd_audio_codecs: LPCM not-hex 00\r\n";
        assert!(ParameterSet::parse(body).is_err());
    }
}
