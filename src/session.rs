use std::net::IpAddr;

use bytes::Bytes;
use log::warn;
use rtcp::{Marshall, RtcpPacket};
use tokio::time::Instant;

use crate::bitrate::{BitrateController, ResolutionClass};
use crate::config::Config;
use crate::encoder::Encoder;
use crate::error::{CloseReason, SessionError, SessionOutcome};
use crate::hdcp::HdcpHandshake;
use crate::keepalive::KeepaliveHandle;
use crate::muxer::Muxer;
use crate::retransmitter::RetransmitterHandle;
use crate::rtp_packet::RtpPacket;
use crate::rtp_session::RtpSession;
use crate::wfd_session::{SessionState, WfdSession};

/// Ties the control-plane state machine to the RTP/RTCP transport layer, the
/// bitrate controller, and the retransmitter, per the data/control flow
/// described in section 2. One `Session` exists per connected sink.
pub struct Session {
    pub wfd: WfdSession,
    pub rtp: RtpSession,
    pub bitrate: Option<BitrateController>,
    pub retransmitter: Option<RetransmitterHandle>,
    pub keepalive: Option<KeepaliveHandle>,
    encoder: Box<dyn Encoder>,
    muxer: Box<dyn Muxer>,
    hdcp: Box<dyn HdcpHandshake>,
}

impl Session {
    pub fn new(wfd: WfdSession, rtp: RtpSession, encoder: Box<dyn Encoder>, muxer: Box<dyn Muxer>, hdcp: Box<dyn HdcpHandshake>) -> Self {
        Self { wfd, rtp, bitrate: None, retransmitter: None, keepalive: None, encoder, muxer, hdcp }
    }

    /// Runs once negotiation (M1-M5) has committed: picks the resolution
    /// class's bitrate triplet and spins up the bitrate controller on the
    /// negotiated transport.
    pub fn start_media(&mut self, config: &Config) {
        let Some(negotiated) = &self.wfd.negotiated else {
            warn!(target: "Session", "start_media called before negotiation completed");
            return;
        };

        let class = ResolutionClass::from_dimensions(negotiated.video_mode.width as u32, negotiated.video_mode.height as u32);
        let is_udp = matches!(&negotiated.rtp_ports, wfdparams::ClientRtpPorts::Udp { .. });

        if let Some(protection) = &negotiated.hdcp {
            if let Err(err) = self.hdcp.enable(protection) {
                warn!(target: "Session", "HDCP handshake failed, continuing without content protection: {err:?}");
            }
        } else {
            self.hdcp.disable();
        }

        let controller = if is_udp {
            BitrateController::new_udp(config.bitrate_table.clone(), class)
        } else {
            BitrateController::new_tcp(config.bitrate_table.clone(), class)
        };
        self.encoder.set_bitrate(controller.current_bitrate());
        self.bitrate = Some(controller);
    }

    /// Feeds one arriving RTP packet (already payload-validated) to the
    /// transport layer.
    pub fn on_rtp(&mut self, pkt: &RtpPacket, remote_addr: IpAddr, now: Instant) -> Result<(), SessionError> {
        self.rtp.process_rtp(pkt, remote_addr, now)
    }

    /// Feeds one arriving compound RTCP buffer, updating RTP-session state
    /// and routing any NACK/PLI/FIR feedback to the retransmitter and
    /// encoder, and any Receiver Reports to the bitrate controller.
    pub fn on_rtcp(&mut self, compound: Bytes, now: Instant, ntp64: u64) -> Result<(), SessionError> {
        let packets = self.rtp.process_rtcp(compound, now, ntp64)?;

        for packet in &packets {
            match packet {
                RtcpPacket::ReceiverReport(rr) => self.apply_receiver_report(rr, now),
                RtcpPacket::TransportLayerFeedbackMessage(nack) => {
                    if let Some(retransmitter) = &self.retransmitter {
                        for entry in &nack.nacks {
                            retransmitter.nack_from_generic(entry);
                        }
                    }
                }
                RtcpPacket::PayloadSpecificFeedbackMessage(_) => {
                    self.encoder.force_idr();
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn apply_receiver_report(&mut self, rr: &rtcp::ReceiverReport, now: Instant) {
        let Some(block) = rr.reports.first() else { return };
        let Some(controller) = &mut self.bitrate else { return };

        if let Some(udp) = controller.as_udp_mut() {
            let decision = udp.on_receiver_report(
                block.fraction_lost,
                block.cumulative_packets_lost,
                block.ext_highest_sequence,
                packets_resend_hint(&self.retransmitter),
                now.into_std(),
            );
            self.encoder.set_bitrate(decision.bitrate);
            if decision.unstable {
                warn!(target: "Session", "UDP path judged unstable at minimum bitrate");
            }
        }
    }

    /// Records an outgoing RTP send both in the RTP session (for RTCP
    /// accounting) and the retention ring (for retransmission).
    pub fn on_rtp_sent(&mut self, pkt: RtpPacket, now: Instant) {
        self.rtp.send_rtp(&pkt, now);
        if let Some(retransmitter) = &self.retransmitter {
            let seq = pkt.seq;
            if let Ok(bytes) = pkt.marshall() {
                retransmitter.sender.send(crate::retransmitter::Message::RegisterSent { seq, packet: bytes }).ok();
            }
        }
    }

    /// Periodic tick driven by the I/O loop's timer wheel: emits due RTCP,
    /// sweeps timed-out sources, and requests a new segment from the muxer
    /// if standing by.
    pub fn on_timer(&mut self, now: Instant, ntp64: u64) -> Vec<(Bytes, bool)> {
        self.rtp.sweep(now);
        self.rtp.on_timeout(now, ntp64)
    }

    /// Unconditionally transitions to `Closed`, best-effort BYE already
    /// having been attempted by the caller, and reports the outcome.
    pub fn close(&mut self, reason: CloseReason) -> SessionOutcome {
        self.wfd.force_close();
        SessionOutcome::Closed(reason)
    }

    pub fn is_playing(&self) -> bool {
        self.wfd.state == SessionState::Playing
    }

    /// Pulls the next payloaded RTP packet ready to send, if any is queued.
    pub fn next_outgoing_packet(&mut self) -> Option<Bytes> {
        self.muxer.next_packet()
    }

    /// Asks the muxer to re-emit PAT/PMT on the next packet, used when
    /// resuming media on a freshly switched transport (section 4.G step 5).
    pub fn request_new_segment(&mut self) {
        self.muxer.request_new_segment();
    }
}

/// The UDP bitrate controller cross-checks RTCP-reported loss against our
/// own retransmit counter (section 4.C); absent a retransmitter (e.g. before
/// SETUP), zero resends have happened.
fn packets_resend_hint(retransmitter: &Option<RetransmitterHandle>) -> u32 {
    retransmitter.as_ref().map_or(0, RetransmitterHandle::packets_resend)
}
