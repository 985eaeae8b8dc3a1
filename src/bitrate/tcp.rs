use std::collections::VecDeque;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use super::table::BitrateTriplet;

/// A single `TCP_INFO` sample, read from the data socket via `getsockopt`.
/// Field names mirror `tcpi_*` from the kernel struct (microsecond units for
/// `rtt`/`rttvar`/`last_data_sent`, per `man 7 tcp`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpInfoSample {
    pub rtt: u32,
    pub rttvar: u32,
    pub last_data_sent: u32,
    pub snd_cwnd: u32,
    pub send_buffer_size: u32,
    pub send_buffer_left: u32,
}

/// Reads the current `TCP_INFO` plus send-buffer occupancy for `fd`.
/// `send_buffer_left` is `SO_SNDBUF` minus the kernel's queued-but-unsent byte
/// count (`TIOCOUTQ`).
pub fn read_tcp_info(fd: RawFd) -> io::Result<TcpInfoSample> {
    unsafe {
        let mut info: libc::tcp_info = mem::zeroed();
        let mut info_len = mem::size_of::<libc::tcp_info>() as libc::socklen_t;
        let ret = libc::getsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_INFO,
            &mut info as *mut _ as *mut libc::c_void,
            &mut info_len,
        );
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut sndbuf: libc::c_int = 0;
        let mut sndbuf_len = mem::size_of::<libc::c_int>() as libc::socklen_t;
        let ret = libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &mut sndbuf as *mut _ as *mut libc::c_void,
            &mut sndbuf_len,
        );
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut queued: libc::c_int = 0;
        let ret = libc::ioctl(fd, libc::TIOCOUTQ, &mut queued as *mut libc::c_int);
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(TcpInfoSample {
            rtt: info.tcpi_rtt,
            rttvar: info.tcpi_rttvar,
            last_data_sent: info.tcpi_last_data_sent,
            snd_cwnd: info.tcpi_snd_cwnd,
            send_buffer_size: sndbuf as u32,
            send_buffer_left: (sndbuf as u32).saturating_sub(queued.max(0) as u32),
        })
    }
}

static RING_CAPACITY: usize = 8;
static STATUS_HISTORY: usize = 10;

/// Per-sample weight tables indexed by ring fill count, weights summing to
/// 100. The 4-entry table is the steady-state (full ring) case.
fn weights_for(count: usize) -> &'static [u32] {
    match count {
        1 => &[100],
        2 => &[40, 60],
        3 => &[20, 30, 50],
        _ => &[10, 20, 30, 40],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Congested,
    Loaded,
    Unloaded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcpDecision {
    pub bitrate: u32,
    pub status: NetworkStatus,
}

/// Drives the encoder bitrate from periodic `TCP_INFO` samples, per section
/// 4.E's TCP-path algorithm.
#[derive(Debug)]
pub struct TcpBitrateController {
    min: u32,
    max: u32,
    current: u32,

    ring: VecDeque<TcpInfoSample>,
    status_history: VecDeque<NetworkStatus>,

    max_send_buffer_left_seen: u32,
    prev_snd_cwnd: Option<u32>,
    rtt_at_last_mode_change: u32,
    samples_since_last_change: u32,
}

impl TcpBitrateController {
    pub fn new(triplet: BitrateTriplet) -> Self {
        Self {
            min: triplet.min,
            max: triplet.max,
            current: triplet.initial,
            ring: VecDeque::with_capacity(RING_CAPACITY),
            status_history: VecDeque::with_capacity(STATUS_HISTORY),
            max_send_buffer_left_seen: 0,
            prev_snd_cwnd: None,
            rtt_at_last_mode_change: 0,
            samples_since_last_change: 0,
        }
    }

    pub fn current_bitrate(&self) -> u32 {
        self.current
    }

    pub fn on_sample(&mut self, sample: TcpInfoSample, now: Instant) -> TcpDecision {
        let _ = now;
        if self.ring.len() == RING_CAPACITY {
            self.ring.pop_front();
        }
        self.ring.push_back(sample);
        self.max_send_buffer_left_seen = self.max_send_buffer_left_seen.max(sample.send_buffer_left);

        let weights = weights_for(self.ring.len());
        let mut moving_rtt: u64 = 0;
        let mut moving_cwnd: u64 = 0;
        for (s, w) in self.ring.iter().zip(weights) {
            moving_rtt += s.rtt as u64 * *w as u64;
            moving_cwnd += s.snd_cwnd as u64 * *w as u64;
        }
        moving_rtt /= 100;
        moving_cwnd /= 100;

        let cwnd_dropped_5 = self.prev_snd_cwnd.map(|p| p.saturating_sub(sample.snd_cwnd) >= 5).unwrap_or(false);
        let cwnd_dropped_2 = self.prev_snd_cwnd.map(|p| p.saturating_sub(sample.snd_cwnd) >= 2).unwrap_or(false);
        let buffer_threshold = self.max_send_buffer_left_seen.saturating_mul(4) / 5;
        let buffer_starved = sample.send_buffer_left < buffer_threshold
            && sample.send_buffer_left < self.max_send_buffer_left_seen.saturating_sub(300_000);

        let status = if sample.last_data_sent > 99
            || cwnd_dropped_5
            || buffer_starved
            || moving_rtt.saturating_sub(self.rtt_at_last_mode_change as u64) > 200_000
        {
            NetworkStatus::Congested
        } else if moving_rtt < 100_000 && sample.last_data_sent <= 99 && !cwnd_dropped_2 {
            NetworkStatus::Unloaded
        } else {
            NetworkStatus::Loaded
        };

        self.prev_snd_cwnd = Some(sample.snd_cwnd);
        if self.status_history.len() == STATUS_HISTORY {
            self.status_history.pop_front();
        }
        self.status_history.push_back(status);
        self.samples_since_last_change += 1;

        self.apply_decision(status, moving_cwnd as u32, buffer_starved, moving_rtt as u32);

        TcpDecision { bitrate: self.current, status }
    }

    fn apply_decision(&mut self, status: NetworkStatus, moving_cwnd: u32, buffer_starved: bool, moving_rtt: u32) {
        let congested_run = self.status_history.iter().rev().take(7).all(|s| *s == NetworkStatus::Congested);
        let loaded_or_worse_recent = self
            .status_history
            .iter()
            .rev()
            .take(5)
            .filter(|s| **s != NetworkStatus::Unloaded)
            .count()
            >= 4;
        let sustained_loaded_run = self.status_history.len() >= STATUS_HISTORY && loaded_or_worse_recent;

        let venc = self.current;
        let mut changed = false;

        if status == NetworkStatus::Congested && self.samples_since_last_change >= 7 && congested_run {
            let has_loss_symptom = buffer_starved;
            let step = if has_loss_symptom { venc / 3 } else { venc / 5 };
            self.current = self.current.saturating_sub(step);
            changed = true;
        } else if sustained_loaded_run && self.samples_since_last_change >= 20 {
            self.current = self.current.saturating_sub(venc / 10);
            changed = true;
        }

        if buffer_starved {
            let window_derived = (self.max - self.min) * moving_cwnd / 30 + self.min;
            if window_derived < self.current {
                self.current = window_derived;
                changed = true;
            }
        }

        if !changed {
            let unloaded_count_10 = self.status_history.iter().rev().take(10).filter(|s| **s == NetworkStatus::Unloaded).count();
            let unloaded_count_5 = self.status_history.iter().rev().take(5).filter(|s| **s == NetworkStatus::Unloaded).count();
            let cwnd_maxed = moving_cwnd >= 30;
            let interval_elapsed = if cwnd_maxed { self.samples_since_last_change >= 10 } else { self.samples_since_last_change >= 20 };

            if unloaded_count_10 >= 7 && unloaded_count_5 >= 4 && interval_elapsed {
                let step = if cwnd_maxed { venc / 5 } else { venc / 10 };
                self.current = self.current.saturating_add(step);
                changed = true;
            }
        }

        if changed {
            self.current = self.current.clamp(self.min, self.max);
            self.samples_since_last_change = 0;
            self.rtt_at_last_mode_change = moving_rtt;
        }
    }
}
