use std::time::{Duration, Instant};

use super::table::BitrateTriplet;

static UNSTABLE_WINDOW: u32 = 15;
static UNSTABLE_WINDOW_SECS: u64 = 15;

/// Result of feeding one RTCP receiver report into the UDP-path controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UdpDecision {
    pub bitrate: u32,
    pub unstable: bool,
}

/// Drives the encoder bitrate from incoming RTCP RRs, per section 4.E's
/// UDP-path algorithm: exponential loss smoothing plus a handful of fixed
/// step sizes.
#[derive(Debug)]
pub struct UdpBitrateController {
    min: u32,
    max: u32,
    current: u32,

    baseline_pending: bool,
    prev_cumulative_lost: Option<u32>,
    prev_max_seq: Option<u32>,
    prev_packets_resend: u32,

    stats_loss: f64,
    moving_avg: f64,
    prev_rr_had_loss: bool,

    consecutive_at_min: u32,
    last_unstable_notice: Option<Instant>,
}

impl UdpBitrateController {
    pub fn new(triplet: BitrateTriplet) -> Self {
        Self {
            min: triplet.min,
            max: triplet.max,
            current: triplet.initial,
            baseline_pending: true,
            prev_cumulative_lost: None,
            prev_max_seq: None,
            prev_packets_resend: 0,
            stats_loss: 0.0,
            moving_avg: 0.0,
            prev_rr_had_loss: false,
            consecutive_at_min: 0,
            last_unstable_notice: None,
        }
    }

    pub fn current_bitrate(&self) -> u32 {
        self.current
    }

    /// `fraction_lost_header` is the RTCP RR's raw fraction-lost byte (0..256
    /// scaled). `cumulative_lost`/`max_seq` are the report block's running
    /// totals, used when the header field reads zero. `packets_resend` is the
    /// retention ring's counter, used to discount reported loss that was
    /// already recovered by retransmission.
    pub fn on_receiver_report(
        &mut self,
        fraction_lost_header: u8,
        cumulative_lost: u32,
        max_seq: u32,
        packets_resend: u32,
        now: Instant,
    ) -> UdpDecision {
        if self.baseline_pending {
            self.baseline_pending = false;
            self.prev_cumulative_lost = Some(cumulative_lost);
            self.prev_max_seq = Some(max_seq);
            self.prev_packets_resend = packets_resend;
            return UdpDecision { bitrate: self.current, unstable: false };
        }

        let mut fraction_lost_pct = if fraction_lost_header != 0 {
            fraction_lost_header as f64 / 256.0 * 100.0
        } else {
            let prev_cumulative = self.prev_cumulative_lost.unwrap_or(cumulative_lost);
            let prev_max_seq = self.prev_max_seq.unwrap_or(max_seq);
            let seq_delta = max_seq.wrapping_sub(prev_max_seq);
            if seq_delta == 0 {
                0.0
            } else {
                let lost_delta = cumulative_lost.wrapping_sub(prev_cumulative) as f64;
                (lost_delta * 100.0 / seq_delta as f64).max(0.0)
            }
        };

        if packets_resend == self.prev_packets_resend {
            fraction_lost_pct = 0.0;
        }

        let alpha = if self.prev_rr_had_loss { 0.8 } else { 1.0 };
        self.stats_loss = alpha * fraction_lost_pct + (1.0 - alpha) * self.stats_loss;
        self.moving_avg = (7.0 / 8.0 * self.moving_avg + 5.0 / 8.0 * self.stats_loss).min(100.0);

        let loss = self.stats_loss;
        if loss >= 5.0 {
            self.current = self.current.saturating_sub(self.max - self.min);
        } else if loss >= 3.0 {
            self.current = self.current.saturating_sub((self.max - self.min) / 2);
        } else if loss > 0.0 {
            self.current = self.current.saturating_sub((self.max - self.min) / 4);
        } else if self.moving_avg < 1.0 {
            let step = if self.prev_rr_had_loss { 1024 * 1024 } else { 512 * 1024 };
            self.current = self.current.saturating_add(step);
        }
        self.current = self.current.clamp(self.min, self.max);

        self.prev_rr_had_loss = loss > 0.0;
        self.prev_cumulative_lost = Some(cumulative_lost);
        self.prev_max_seq = Some(max_seq);
        self.prev_packets_resend = packets_resend;

        let unstable = self.note_unstable(now);

        UdpDecision { bitrate: self.current, unstable }
    }

    fn note_unstable(&mut self, now: Instant) -> bool {
        if self.current == self.min {
            self.consecutive_at_min += 1;
        } else {
            self.consecutive_at_min = 0;
            return false;
        }

        if self.consecutive_at_min < UNSTABLE_WINDOW {
            return false;
        }

        let elapsed_ok = match self.last_unstable_notice {
            Some(last) => now.duration_since(last) >= Duration::from_secs(UNSTABLE_WINDOW_SECS),
            None => true,
        };
        if elapsed_ok {
            self.last_unstable_notice = Some(now);
            true
        } else {
            false
        }
    }
}
