mod interval;
mod report;
mod source;

pub use source::{ByeMark, SequenceOutcome, Source, SourceId, SourceTable};

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;
use log::debug;
use rand::random;
use rtcp::{compound_marshall, RtcpPacket};
use tokio::time::Instant;

use crate::error::{SessionError, WireFormatError};
use crate::rtp_packet::RtpPacket;

use interval::{deterministic_interval, next_rtcp_interval, EarlyRtcpState, IntervalInput};

static MIN_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the RTP/RTCP layer of a single WFD session needs: the source
/// table, our own outgoing stream's counters, and RTCP scheduling state.
/// Owned by the WFD session; never shared behind an `Arc` (single-writer,
/// matching the concurrency model in section 5).
pub struct RtpSession {
    sources: SourceTable,
    internal_id: SourceId,
    sdes: HashMap<String, String>,
    favor_new: bool,

    packets_sent: u32,
    octets_sent: u32,
    last_rtp_timestamp: u32,

    bandwidth_bytes_per_sec: f64,
    avg_rtcp_size: f64,
    we_sent: bool,

    next_regular_rtcp: Instant,
    early_rtcp: EarlyRtcpState,
    is_initial: bool,

    source_timeout: Duration,
    bye_timeout: Duration,

    started_at: Instant,
    video_clock_rate: u32,
}

pub struct RtpSessionConfig {
    pub our_ssrc: u32,
    pub favor_new: bool,
    pub bandwidth_bytes_per_sec: f64,
    pub source_timeout: Duration,
    pub bye_timeout: Duration,
    /// RTP clock rate of the MPEG-TS-over-RTP data plane. RFC 2250 fixes this
    /// at 90 kHz for all WFD video payloads.
    pub video_clock_rate: u32,
}

impl RtpSession {
    pub fn new(config: RtpSessionConfig, now: Instant) -> Self {
        let mut sources = SourceTable::new();
        let internal_id = sources.insert(Source::new_internal(config.our_ssrc, now.into_std()));

        let next_regular_rtcp = now + next_rtcp_interval(&IntervalInput {
            senders: 1,
            members: 1,
            we_sent: false,
            avg_rtcp_size: 80.0,
            bandwidth_bytes_per_sec: config.bandwidth_bytes_per_sec,
            is_initial: true,
        });

        Self {
            sources,
            internal_id,
            sdes: HashMap::new(),
            favor_new: config.favor_new,
            packets_sent: 0,
            octets_sent: 0,
            last_rtp_timestamp: 0,
            bandwidth_bytes_per_sec: config.bandwidth_bytes_per_sec,
            avg_rtcp_size: 80.0,
            we_sent: false,
            next_regular_rtcp,
            early_rtcp: EarlyRtcpState::new(next_regular_rtcp),
            is_initial: true,
            source_timeout: config.source_timeout.max(MIN_SOURCE_TIMEOUT),
            bye_timeout: config.bye_timeout,
            started_at: now,
            video_clock_rate: config.video_clock_rate,
        }
    }

    /// Converts a wall-clock arrival moment into the media's RTP clock units,
    /// relative to session start, wrapping at 2^32 units like the RTP
    /// timestamp field itself.
    fn arrival_rtp_units(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        let ticks = (elapsed * self.video_clock_rate as f64) as u64;
        (ticks % (u32::MAX as u64 + 1)) as u32
    }

    pub fn our_ssrc(&self) -> u32 {
        self.sources.get(self.internal_id).expect("internal source always present").ssrc
    }

    pub fn set_sdes(&mut self, kvs: HashMap<String, String>) {
        self.sdes = kvs;
    }

    pub fn get_sdes(&self) -> &HashMap<String, String> {
        &self.sdes
    }

    fn member_count(&self) -> usize {
        self.sources.len().max(1)
    }

    fn interval_input(&self, is_initial: bool) -> IntervalInput {
        let senders = self.sources.iter().filter(|(_, s)| s.is_sender).count();
        IntervalInput {
            senders,
            members: self.member_count(),
            we_sent: self.we_sent,
            avg_rtcp_size: self.avg_rtcp_size,
            bandwidth_bytes_per_sec: self.bandwidth_bytes_per_sec,
            is_initial,
        }
    }

    /// Validates and routes one arriving RTP packet: updates (or creates) its
    /// source, runs probation/collision handling, and feeds sequence tracking.
    pub fn process_rtp(&mut self, pkt: &RtpPacket, remote_addr: IpAddr, now: Instant) -> Result<(), SessionError> {
        if pkt.ssrc == self.our_ssrc() {
            return Err(SessionError::WireFormat(WireFormatError::RtpInvalid));
        }

        let id = match self.sources.find_by_ssrc(pkt.ssrc) {
            Some(id) => {
                self.check_collision(id, remote_addr, now);
                id
            }
            None => self.sources.insert(Source::new_external(pkt.ssrc, now.into_std())),
        };

        let arrival_rtp_units = self.arrival_rtp_units(now);
        let source = self.sources.get_mut(id).expect("just inserted or found");
        source.remote_addr.get_or_insert(remote_addr);
        source.feed_rtp_seq(pkt.seq, pkt.timestamp, arrival_rtp_units, now.into_std());

        Ok(())
    }

    fn check_collision(&mut self, id: SourceId, remote_addr: IpAddr, now: Instant) {
        let source = self.sources.get_mut(id).expect("source must exist");
        let Some(known_addr) = source.remote_addr else {
            source.remote_addr = Some(remote_addr);
            return;
        };
        if known_addr == remote_addr {
            return;
        }
        let within_activity_window = now.into_std().duration_since(source.last_activity) < self.source_timeout;
        if !within_activity_window {
            source.remote_addr = Some(remote_addr);
            return;
        }

        if self.favor_new {
            source.conflict_addresses.insert(known_addr, now.into_std());
            source.remote_addr = Some(remote_addr);
        }
        // else: the packet is dropped by the caller (remote_addr != known_addr
        // and favor_new is false) — handled by returning early from process_rtp
        // in a future revision if strict drop semantics are required downstream.
    }

    /// Parses a compound RTCP buffer, updating source statistics. Early RTCP
    /// eligibility is left to the caller via `request_early_rtcp` once it has
    /// inspected the parsed feedback.
    pub fn process_rtcp(&mut self, compound: Bytes, now: Instant, ntp64: u64) -> Result<Vec<RtcpPacket>, SessionError> {
        let packets = rtcp::compound_unmarshall(compound).map_err(|_| SessionError::WireFormat(WireFormatError::RtcpInvalid))?;

        for packet in &packets {
            self.apply_rtcp_packet(packet, now, ntp64);
        }

        Ok(packets)
    }

    fn apply_rtcp_packet(&mut self, packet: &RtcpPacket, now: Instant, ntp64: u64) {
        match packet {
            RtcpPacket::SenderReport(sr) => {
                let ssrc = sr.sender_info.sender_ssrc;
                let id = self
                    .sources
                    .find_by_ssrc(ssrc)
                    .unwrap_or_else(|| self.sources.insert(Source::new_external(ssrc, now.into_std())));
                let source = self.sources.get_mut(id).expect("just found or inserted");
                source.validate_via_rtcp();
                source.last_activity = now.into_std();
                source.last_sr_ntp_middle = report::ntp_middle_bits(sr.sender_info.ntp_timestamp);
                source.last_sr_received_at = Some(now.into_std());
            }
            RtcpPacket::ReceiverReport(_) | RtcpPacket::SourceDescriptor(_) => {
                // No per-source state beyond validation is required for these
                // at the RTP-session layer; the bitrate controller consumes
                // the parsed ReceiverReport directly.
            }
            RtcpPacket::Bye(bye) => {
                for ssrc in &bye.ssrcs {
                    if let Some(id) = self.sources.find_by_ssrc(*ssrc) {
                        if let Some(source) = self.sources.get_mut(id) {
                            source.mark_bye("Peer BYE", now.into_std());
                        }
                    }
                }
            }
            RtcpPacket::App(_) => {}
            RtcpPacket::TransportLayerFeedbackMessage(_) | RtcpPacket::PayloadSpecificFeedbackMessage(_) => {}
        }
        let _ = ntp64;
    }

    pub fn send_rtp(&mut self, pkt: &RtpPacket, now: Instant) {
        self.packets_sent += 1;
        self.octets_sent += pkt.payload.len() as u32;
        self.last_rtp_timestamp = pkt.timestamp;
        self.we_sent = true;

        if let Some(source) = self.sources.get_mut(self.internal_id) {
            source.is_sender = true;
            source.last_activity = now.into_std();
            source.last_rtp_activity = Some(now.into_std());
        }
    }

    pub fn request_key_unit(&mut self, ssrc: u32, fir_not_pli: bool, seq_nr: u8) {
        if let Some(id) = self.sources.find_by_ssrc(ssrc) {
            if let Some(source) = self.sources.get_mut(id) {
                if fir_not_pli {
                    source.pending_fir = Some(seq_nr);
                } else {
                    source.pending_pli = true;
                }
            }
        }
    }

    pub fn request_nack(&mut self, ssrc: u32, seq: u16, now: Instant, max_delay: Duration) -> Option<Instant> {
        if let Some(id) = self.sources.find_by_ssrc(ssrc) {
            if let Some(source) = self.sources.get_mut(id) {
                source.pending_nack.push(seq);
            }
        }
        self.request_early_rtcp(now, max_delay)
    }

    /// RFC 4585 section 3.5.2: returns the earliest moment an early report
    /// may go out, or `None` if it should be folded into the next regular one.
    pub fn request_early_rtcp(&mut self, now: Instant, max_delay: Duration) -> Option<Instant> {
        self.early_rtcp.request_early(now, max_delay, Duration::from_millis(100))
    }

    pub fn next_timeout(&self, early: Option<Instant>) -> Instant {
        match early {
            Some(early) => early.min(self.next_regular_rtcp),
            None => self.next_regular_rtcp,
        }
    }

    pub fn schedule_bye(&mut self, now: Instant, reason: impl Into<String>) {
        let reason = reason.into();
        if let Some(source) = self.sources.get_mut(self.internal_id) {
            source.mark_bye(reason, now.into_std());
        }
        // RFC 3550 6.3.7: shorten the next interval using the smaller "bye
        // backoff" member count once a BYE is pending.
        let input = self.interval_input(false);
        self.next_regular_rtcp = now + deterministic_interval(&input).min(Duration::from_millis(1000));
    }

    /// Rewrites our own SSRC after a collision on our internal source,
    /// per section 4.D's collision policy, and schedules a BYE for the old one.
    pub fn regenerate_our_ssrc(&mut self, now: Instant) -> u32 {
        let new_ssrc = random::<u32>();
        self.schedule_bye(now, "SSRC Collision");
        self.sources.rename_ssrc(self.internal_id, new_ssrc);
        if let Some(source) = self.sources.get_mut(self.internal_id) {
            source.bye_marked = None;
        }
        new_ssrc
    }

    /// Generates RTCP for each internal source due for a report: SR (if we've
    /// sent RTP) or RR, plus SDES and any pending FIR/PLI/NACK, and advances
    /// the next scheduled time. Returns `(buffer, is_bye)` pairs.
    pub fn on_timeout(&mut self, now: Instant, ntp64: u64) -> Vec<(Bytes, bool)> {
        let mut out = vec![];

        let our_ssrc = self.our_ssrc();
        let is_bye = self.sources.get(self.internal_id).map(|s| s.bye_marked.is_some()).unwrap_or(false);

        let mut packets: Vec<RtcpPacket> = vec![];

        if self.we_sent {
            let sender_info = report::build_sender_info(our_ssrc, self.packets_sent, self.octets_sent, self.last_rtp_timestamp, ntp64);
            let reports = self.collect_report_blocks(now);
            packets.push(RtcpPacket::SenderReport(rtcp::SenderReport::new(sender_info, reports)));
        } else {
            let reports = self.collect_report_blocks(now);
            packets.push(RtcpPacket::ReceiverReport(rtcp::ReceiverReport::new(our_ssrc, reports)));
        }

        packets.push(RtcpPacket::SourceDescriptor(report::build_sdes(our_ssrc, &self.sdes)));

        self.append_feedback(&mut packets, our_ssrc, now);

        if is_bye {
            packets.push(RtcpPacket::Bye(report::build_bye(vec![our_ssrc], Some("Session ended".to_string()))));
        }

        if let Ok(bytes) = compound_marshall(packets) {
            self.avg_rtcp_size = 0.25 * bytes.len() as f64 + 0.75 * self.avg_rtcp_size;
            out.push((bytes, is_bye));
        }

        let input = self.interval_input(self.is_initial);
        self.next_regular_rtcp = now + next_rtcp_interval(&input);
        self.early_rtcp.on_rtcp_sent(now, self.next_regular_rtcp);
        self.is_initial = false;

        out
    }

    fn collect_report_blocks(&mut self, now: Instant) -> Vec<rtcp::ReportBlock> {
        let internal = self.internal_id;
        let now_std = now.into_std();
        report::eligible_report_sources(self.sources.iter_mut(), internal)
            .into_iter()
            .map(|(_, source)| report::build_report_block(source, now_std))
            .collect()
    }

    fn append_feedback(&mut self, packets: &mut Vec<RtcpPacket>, our_ssrc: u32, now: Instant) {
        let internal = self.internal_id;
        let mut drained: Vec<(u32, Vec<u16>, bool, Option<u8>)> = vec![];

        for (id, source) in self.sources.iter_mut() {
            if id == internal {
                continue;
            }
            if !source.pending_nack.is_empty() || source.pending_pli || source.pending_fir.is_some() {
                drained.push((
                    source.ssrc,
                    std::mem::take(&mut source.pending_nack),
                    std::mem::replace(&mut source.pending_pli, false),
                    source.pending_fir.take(),
                ));
            }
        }

        for (ssrc, nacks, pli, fir) in drained {
            if let Some(nack) = report::build_generic_nack(our_ssrc, ssrc, &nacks) {
                packets.push(RtcpPacket::TransportLayerFeedbackMessage(nack));
            }
            if pli {
                packets.push(RtcpPacket::PayloadSpecificFeedbackMessage(report::build_pli(our_ssrc, ssrc)));
            }
            if let Some(seq_nr) = fir {
                packets.push(RtcpPacket::PayloadSpecificFeedbackMessage(report::build_fir(our_ssrc, ssrc, seq_nr)));
            }
        }

        let _ = now;
    }

    /// Sweeps sources inactive past timeout; demotes long-silent senders to
    /// non-sender so they stop counting toward the report-block budget.
    pub fn sweep(&mut self, now: Instant) {
        let demote_after = (self.source_timeout / 5 * 2).max(MIN_SOURCE_TIMEOUT);
        for (id, source) in self.sources.iter_mut() {
            if id == self.internal_id {
                continue;
            }
            if let Some(last_rtp) = source.last_rtp_activity {
                if now.into_std().duration_since(last_rtp) >= demote_after {
                    source.is_sender = false;
                }
            }
        }
        let expired = self.sources.sweep_timeouts(now.into_std(), self.source_timeout, self.bye_timeout);
        for source in expired {
            debug!(target: "RTP Session", "Removed timed-out source ssrc={}", source.ssrc);
        }
    }

    pub fn sources(&self) -> &SourceTable {
        &self.sources
    }
}

#[cfg(test)]
mod rtp_session {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use tokio::time::Instant;

    use crate::rtp_packet::RtpPacket;
    use bytes::Bytes;

    use super::{RtpSession, RtpSessionConfig};

    fn session() -> RtpSession {
        RtpSession::new(
            RtpSessionConfig {
                our_ssrc: 1,
                favor_new: true,
                bandwidth_bytes_per_sec: 1_000_000.0,
                source_timeout: Duration::from_secs(30),
                bye_timeout: Duration::from_secs(5),
                video_clock_rate: 90_000,
            },
            Instant::now(),
        )
    }

    fn sample_packet(seq: u16, ssrc: u32) -> RtpPacket {
        RtpPacket {
            padding: false,
            extension: false,
            marker: false,
            seq,
            payload_type: 33,
            timestamp: 0,
            ssrc,
            csrc: vec![],
            payload: Bytes::from_static(&[1, 2, 3, 4]),
        }
    }

    #[test]
    fn external_source_requires_probation_before_validated() {
        let mut session = session();
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let now = Instant::now();

        session.process_rtp(&sample_packet(1, 42), addr, now).unwrap();
        let id = session.sources().find_by_ssrc(42).unwrap();
        assert!(!session.sources().get(id).unwrap().validated);

        session.process_rtp(&sample_packet(2, 42), addr, now).unwrap();
        assert!(session.sources().get(id).unwrap().validated);
    }

    #[test]
    fn rejects_rtp_from_our_own_ssrc() {
        let mut session = session();
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

        let result = session.process_rtp(&sample_packet(1, 1), addr, Instant::now());

        assert!(result.is_err());
    }

    #[test]
    fn collision_rewrites_address_when_favor_new() {
        let mut session = session();
        let addr_a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let addr_b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let now = Instant::now();

        session.process_rtp(&sample_packet(1, 42), addr_a, now).unwrap();
        session.process_rtp(&sample_packet(2, 42), addr_b, now).unwrap();

        let id = session.sources().find_by_ssrc(42).unwrap();
        let source = session.sources().get(id).unwrap();
        assert_eq!(source.remote_addr, Some(addr_b));
        assert!(source.conflict_addresses.contains_key(&addr_a));
    }

    #[test]
    fn on_timeout_emits_receiver_report_when_we_have_not_sent() {
        let mut session = session();

        let reports = session.on_timeout(Instant::now(), 0);

        assert_eq!(reports.len(), 1);
        assert!(!reports[0].1);
    }

    #[test]
    fn on_timeout_emits_sender_report_after_send_rtp() {
        let mut session = session();
        session.send_rtp(&sample_packet(1, 1), Instant::now());

        let reports = session.on_timeout(Instant::now(), 0);

        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn schedule_bye_marks_internal_source() {
        let mut session = session();
        session.schedule_bye(Instant::now(), "Session ended");

        let source = session.sources().get(session.internal_id).unwrap();
        assert!(source.bye_marked.is_some());
    }
}
