use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use tokio::time::Duration;

/// Identifies a [`Source`] inside a [`super::RtpSession`]'s arena. Kept
/// separate from the SSRC because the SSRC can change across a collision
/// while the slot identity (and any pending callbacks referencing it) should
/// not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) usize);

static MAX_DROPOUT: u16 = 3000;
static MAX_MISORDER: u32 = 100;
static RTP_SEQ_MOD: u32 = 1 << 16;
static DEFAULT_PROBATION: u32 = 2;

/// Per-SSRC bookkeeping. One `Source` models either our own internal stream
/// (`is_internal = true`) or a foreign source discovered via incoming
/// RTP/RTCP.
#[derive(Debug, Clone)]
pub struct Source {
    pub ssrc: u32,
    pub is_internal: bool,
    pub is_sender: bool,
    pub validated: bool,
    pub probation_counter: u32,
    pub last_activity: Instant,
    pub last_rtp_activity: Option<Instant>,
    pub remote_addr: Option<IpAddr>,

    pub stats: SequenceStats,
    pub fraction_lost: u8,
    pub jitter: u32,
    last_transit: Option<i32>,
    pub last_sr_ntp_middle: u32,
    pub last_sr_received_at: Option<Instant>,

    pub sdes: HashMap<String, String>,
    pub bye_marked: Option<ByeMark>,
    pub conflict_addresses: HashMap<IpAddr, Instant>,

    pub retained_rtcp: Vec<(Instant, Vec<u8>)>,
    pub pending_nack: Vec<u16>,
    pub pending_fir: Option<u8>,
    pub pending_pli: bool,

    expected_prior: u32,
    received_prior: u32,
}

#[derive(Debug, Clone)]
pub struct ByeMark {
    pub reason: String,
    pub bye_time: Instant,
}

/// The RFC 3550 Appendix A.1 sequence-number state machine: tracks cycles,
/// gaps, and misordering to derive cumulative loss and the extended highest
/// sequence number.
#[derive(Debug, Clone)]
pub struct SequenceStats {
    pub max_seq: u16,
    pub cycles: u32,
    pub base_seq: u32,
    bad_seq: u32,
    pub received: u32,
    initialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequenceOutcome {
    InOrder,
    /// The peer appears to have restarted; sequence state was reset.
    Resynced,
    /// A very large jump that isn't yet confirmed as a resync.
    Invalid,
}

impl SequenceStats {
    fn new(seq: u16) -> Self {
        Self {
            max_seq: seq,
            cycles: 0,
            base_seq: seq as u32,
            bad_seq: RTP_SEQ_MOD + 1,
            received: 1,
            initialized: true,
        }
    }

    pub fn update(&mut self, seq: u16) -> SequenceOutcome {
        if !self.initialized {
            *self = SequenceStats::new(seq);
            return SequenceOutcome::InOrder;
        }

        let u_delta = seq.wrapping_sub(self.max_seq);

        if u_delta < MAX_DROPOUT {
            if seq < self.max_seq {
                self.cycles += RTP_SEQ_MOD;
            }
            self.max_seq = seq;
            self.received += 1;
            SequenceOutcome::InOrder
        } else if (u_delta as u32) <= RTP_SEQ_MOD - MAX_MISORDER {
            if seq as u32 == self.bad_seq {
                *self = SequenceStats::new(seq);
                SequenceOutcome::Resynced
            } else {
                self.bad_seq = (seq as u32 + 1) & (RTP_SEQ_MOD - 1);
                SequenceOutcome::Invalid
            }
        } else {
            self.received += 1;
            SequenceOutcome::InOrder
        }
    }

    pub fn extended_highest_seq(&self) -> u32 {
        self.cycles + self.max_seq as u32
    }

    pub fn expected(&self) -> u32 {
        self.extended_highest_seq() - self.base_seq + 1
    }

    pub fn cumulative_lost(&self) -> u32 {
        self.expected().saturating_sub(self.received)
    }
}

impl Source {
    pub fn new_internal(ssrc: u32, now: Instant) -> Self {
        let mut source = Self::new(ssrc, now);
        source.is_internal = true;
        source.validated = true;
        source
    }

    pub fn new_external(ssrc: u32, now: Instant) -> Self {
        let mut source = Self::new(ssrc, now);
        source.probation_counter = DEFAULT_PROBATION;
        source
    }

    fn new(ssrc: u32, now: Instant) -> Self {
        Self {
            ssrc,
            is_internal: false,
            is_sender: false,
            validated: false,
            probation_counter: 0,
            last_activity: now,
            last_rtp_activity: None,
            remote_addr: None,
            stats: SequenceStats { initialized: false, max_seq: 0, cycles: 0, base_seq: 0, bad_seq: 0, received: 0 },
            fraction_lost: 0,
            jitter: 0,
            last_transit: None,
            last_sr_ntp_middle: 0,
            last_sr_received_at: None,
            sdes: HashMap::new(),
            bye_marked: None,
            conflict_addresses: HashMap::new(),
            retained_rtcp: Vec::new(),
            pending_nack: Vec::new(),
            pending_fir: None,
            pending_pli: false,
            expected_prior: 0,
            received_prior: 0,
        }
    }

    /// Feeds one arriving RTP packet's sequence number into probation and
    /// sequence-tracking. RTCP arrival short-circuits probation because
    /// RTCP-reachable SSRCs are authoritative (see `validate_via_rtcp`).
    ///
    /// `arrival_rtp_units` is the receiver's wall-clock arrival time expressed
    /// in the media's RTP clock units, used for the RFC 3550 appendix A.8
    /// interarrival jitter estimate.
    pub fn feed_rtp_seq(&mut self, seq: u16, rtp_timestamp: u32, arrival_rtp_units: u32, now: Instant) -> SequenceOutcome {
        self.last_activity = now;
        self.last_rtp_activity = Some(now);
        self.is_sender = true;
        self.update_jitter(rtp_timestamp, arrival_rtp_units);

        if !self.validated {
            if self.probation_counter > 1 {
                self.probation_counter -= 1;
                self.stats = SequenceStats::new(seq);
                return SequenceOutcome::InOrder;
            }
            self.validated = true;
            self.stats = SequenceStats::new(seq);
            return SequenceOutcome::InOrder;
        }

        self.stats.update(seq)
    }

    fn update_jitter(&mut self, rtp_timestamp: u32, arrival_rtp_units: u32) {
        let transit = arrival_rtp_units.wrapping_sub(rtp_timestamp) as i32;
        if let Some(last_transit) = self.last_transit {
            let d = (transit.wrapping_sub(last_transit) as f64).abs();
            self.jitter = (self.jitter as f64 + (d - self.jitter as f64) / 16.0).round() as u32;
        }
        self.last_transit = Some(transit);
    }

    pub fn validate_via_rtcp(&mut self) {
        self.validated = true;
    }

    pub fn fraction_lost_since_last_report(&mut self) -> u8 {
        let expected = self.stats.expected();
        let expected_interval = expected.saturating_sub(self.expected_prior);
        let received_interval = self.stats.received.saturating_sub(self.received_prior);
        let lost_interval = expected_interval.wrapping_sub(received_interval);

        self.expected_prior = expected;
        self.received_prior = self.stats.received;

        if expected_interval == 0 || (lost_interval as i64) <= 0 {
            return 0;
        }
        ((lost_interval << 8) / expected_interval.max(1)) as u8
    }

    pub fn is_active(&self) -> bool {
        self.is_sender && self.bye_marked.is_none()
    }

    pub fn mark_bye(&mut self, reason: impl Into<String>, now: Instant) {
        self.bye_marked = Some(ByeMark { reason: reason.into(), bye_time: now });
    }
}

/// A single-writer arena of sources indexed by [`SourceId`], with an SSRC
/// lookup table. Avoids cyclic back-pointers: callers identify a source by
/// id, not by a reference into this struct, per the cyclic-reference design
/// note.
#[derive(Debug, Default)]
pub struct SourceTable {
    slots: Vec<Option<Source>>,
    by_ssrc: HashMap<u32, SourceId>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Source) -> SourceId {
        let ssrc = source.ssrc;
        let id = SourceId(self.slots.len());
        self.slots.push(Some(source));
        self.by_ssrc.insert(ssrc, id);
        id
    }

    pub fn get(&self, id: SourceId) -> Option<&Source> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    pub fn find_by_ssrc(&self, ssrc: u32) -> Option<SourceId> {
        self.by_ssrc.get(&ssrc).copied()
    }

    pub fn remove(&mut self, id: SourceId) -> Option<Source> {
        let source = self.slots.get_mut(id.0)?.take()?;
        self.by_ssrc.remove(&source.ssrc);
        Some(source)
    }

    pub fn rename_ssrc(&mut self, id: SourceId, new_ssrc: u32) {
        if let Some(source) = self.get_mut(id) {
            let old_ssrc = source.ssrc;
            source.ssrc = new_ssrc;
            self.by_ssrc.remove(&old_ssrc);
            self.by_ssrc.insert(new_ssrc, id);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &Source)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (SourceId(i), s)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SourceId, &mut Source)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|s| (SourceId(i), s)))
    }

    pub fn len(&self) -> usize {
        self.by_ssrc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ssrc.is_empty()
    }

    /// Sweeps sources inactive for longer than `timeout`, and BYE'd sources
    /// past `bye_timeout`. Returns the removed sources for the caller to log
    /// or otherwise react to.
    pub fn sweep_timeouts(&mut self, now: Instant, timeout: Duration, bye_timeout: Duration) -> Vec<Source> {
        let mut expired = vec![];
        let ids: Vec<SourceId> = self.iter().map(|(id, _)| id).collect();
        for id in ids {
            let should_remove = {
                let source = self.get(id).unwrap();
                match &source.bye_marked {
                    Some(mark) => now.duration_since(mark.bye_time) >= bye_timeout,
                    None => now.duration_since(source.last_activity) >= timeout,
                }
            };
            if should_remove {
                if let Some(source) = self.remove(id) {
                    expired.push(source);
                }
            }
        }
        expired
    }
}

#[cfg(test)]
mod sequence_stats {
    use super::SequenceStats;

    #[test]
    fn packet_skips_three_seq() {
        let mut stats = SequenceStats::new(2);
        stats.update(6);

        assert_eq!(stats.max_seq, 6);
        assert_eq!(stats.received, 2);
    }

    #[test]
    fn wraps_around_cycle() {
        let mut stats = SequenceStats::new(u16::MAX);
        stats.update(1);

        assert_eq!(stats.cycles, u16::MAX as u32 + 1);
        assert_eq!(stats.max_seq, 1);
    }

    #[test]
    fn cumulative_lost_counts_gap() {
        let mut stats = SequenceStats::new(1);
        stats.update(4);

        assert_eq!(stats.cumulative_lost(), 2);
    }
}


#[cfg(test)]
mod probation {
    use std::time::Instant;

    use super::Source;

    #[test]
    fn external_source_requires_probation() {
        let mut source = Source::new_external(5, Instant::now());
        assert!(!source.validated);

        source.feed_rtp_seq(1, 0, 0, Instant::now());
        assert!(!source.validated);

        source.feed_rtp_seq(2, 0, 1, Instant::now());
        assert!(source.validated);
    }

    #[test]
    fn internal_source_is_always_validated() {
        let source = Source::new_internal(5, Instant::now());
        assert!(source.validated);
    }

    #[test]
    fn jitter_stays_zero_for_evenly_spaced_arrivals() {
        let mut source = Source::new_external(5, Instant::now());
        source.feed_rtp_seq(1, 0, 0, Instant::now());
        source.feed_rtp_seq(2, 3000, 3000, Instant::now());
        source.feed_rtp_seq(3, 6000, 6000, Instant::now());

        assert_eq!(source.jitter, 0);
    }

    #[test]
    fn jitter_grows_when_arrivals_are_uneven() {
        let mut source = Source::new_external(5, Instant::now());
        source.feed_rtp_seq(1, 0, 0, Instant::now());
        source.feed_rtp_seq(2, 3000, 3000, Instant::now());
        source.feed_rtp_seq(3, 6000, 9000, Instant::now());

        assert!(source.jitter > 0);
    }
}
