use rand::Rng;
use rand::thread_rng;
use tokio::time::Duration;

/// Parameters feeding the RFC 3550 section 6.3.1 RTCP interval calculation.
pub struct IntervalInput {
    pub senders: usize,
    pub members: usize,
    pub we_sent: bool,
    pub avg_rtcp_size: f64,
    pub bandwidth_bytes_per_sec: f64,
    pub is_initial: bool,
}

static RTCP_MIN_TIME: Duration = Duration::from_millis(5000);
/// 5% of session bandwidth is reserved for RTCP by default.
static RTCP_BANDWIDTH_FRACTION: f64 = 0.05;
static SENDER_BANDWIDTH_FRACTION: f64 = 0.25;
static RECEIVER_BANDWIDTH_FRACTION: f64 = 0.75;
/// Compensate for the fact that the timer reconsideration algorithm converges
/// to a value a factor of e larger than the true average, per RFC 3550.
static COMPENSATION_FACTOR: f64 = 2.718281828;

/// Computes the deterministic RTCP interval, then applies the ±50% jitter and
/// the first-interval ×1.5 multiplier described in section 4.D.
pub fn next_rtcp_interval(input: &IntervalInput) -> Duration {
    let deterministic = deterministic_interval(input);
    let mut seconds = deterministic.as_secs_f64();

    if input.is_initial {
        seconds *= 1.5;
    }

    let jitter_factor = thread_rng().gen_range(0.5..1.5);
    seconds *= jitter_factor;

    Duration::from_secs_f64(seconds.max(0.0))
}

/// The interval with jitter/initial-multiplier removed — used by callers
/// (like reverse reconsideration) that need the "true" average rather than
/// one particular scheduled instant.
pub fn deterministic_interval(input: &IntervalInput) -> Duration {
    let bandwidth_fraction = if input.we_sent && input.senders * 4 < input.members {
        SENDER_BANDWIDTH_FRACTION
    } else {
        RECEIVER_BANDWIDTH_FRACTION
    };

    let rtcp_bandwidth = input.bandwidth_bytes_per_sec * RTCP_BANDWIDTH_FRACTION * bandwidth_fraction;
    let n = input.members.max(1) as f64;

    let t = if rtcp_bandwidth <= 0.0 {
        RTCP_MIN_TIME.as_secs_f64()
    } else {
        n * input.avg_rtcp_size / rtcp_bandwidth
    };

    Duration::from_secs_f64(t.max(RTCP_MIN_TIME.as_secs_f64()) / COMPENSATION_FACTOR)
}

/// RFC 4585 section 3.5.2: decides whether an early (immediate) RTCP report
/// may be sent, or whether the request must be deferred to the next
/// regularly scheduled interval.
pub struct EarlyRtcpState {
    last_rtcp_send: Option<tokio::time::Instant>,
    next_scheduled: tokio::time::Instant,
}

impl EarlyRtcpState {
    pub fn new(next_scheduled: tokio::time::Instant) -> Self {
        Self { last_rtcp_send: None, next_scheduled }
    }

    pub fn on_rtcp_sent(&mut self, now: tokio::time::Instant, next_scheduled: tokio::time::Instant) {
        self.last_rtcp_send = Some(now);
        self.next_scheduled = next_scheduled;
    }

    /// Returns `Some(when)` — the earliest permissible moment to send the
    /// requested early report — or `None` if the request should be merged
    /// into the next regular interval because sending now would violate the
    /// minimum inter-report gap.
    pub fn request_early(&self, now: tokio::time::Instant, max_delay: Duration, t_min: Duration) -> Option<tokio::time::Instant> {
        let earliest_allowed = match self.last_rtcp_send {
            Some(last) => last + t_min,
            None => now,
        };

        let deadline = now + max_delay;
        if self.next_scheduled <= deadline {
            return None;
        }

        Some(earliest_allowed.max(now))
    }
}

#[cfg(test)]
mod deterministic_interval_tests {
    use super::{deterministic_interval, IntervalInput};

    #[test]
    fn floors_at_minimum() {
        let input = IntervalInput {
            senders: 0,
            members: 1,
            we_sent: false,
            avg_rtcp_size: 0.0,
            bandwidth_bytes_per_sec: 0.0,
            is_initial: false,
        };

        let interval = deterministic_interval(&input);

        assert!(interval.as_secs_f64() > 0.0);
    }

    #[test]
    fn scales_with_membership() {
        let small = IntervalInput {
            senders: 0,
            members: 2,
            we_sent: false,
            avg_rtcp_size: 200.0,
            bandwidth_bytes_per_sec: 1_000_000.0,
            is_initial: false,
        };
        let large = IntervalInput {
            senders: 0,
            members: 200,
            we_sent: false,
            avg_rtcp_size: 200.0,
            bandwidth_bytes_per_sec: 1_000_000.0,
            is_initial: false,
        };

        assert!(deterministic_interval(&large) >= deterministic_interval(&small));
    }
}

#[cfg(test)]
mod early_rtcp {
    use tokio::time::{Duration, Instant};

    use super::EarlyRtcpState;

    #[test]
    fn suppresses_when_regular_report_is_sooner() {
        let now = Instant::now();
        let state = EarlyRtcpState::new(now + Duration::from_millis(50));

        let result = state.request_early(now, Duration::from_millis(200), Duration::from_millis(100));

        assert!(result.is_none());
    }

    #[test]
    fn allows_when_regular_report_is_far_away() {
        let now = Instant::now();
        let state = EarlyRtcpState::new(now + Duration::from_secs(5));

        let result = state.request_early(now, Duration::from_millis(200), Duration::from_millis(100));

        assert!(result.is_some());
    }
}
