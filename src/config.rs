use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::bitrate::BitrateTable;

pub struct Config {
    pub rtsp_server: RtspServerConfig,
    pub uibc_port: u16,
    pub rtcp_feedback_port: u16,
    pub session_timeout: Duration,
    pub retention_ring_capacity: usize,
    pub max_resend_multiplicity: u32,
    pub resend_loss_update_window: Duration,
    pub udp_recv_buffer_bytes: u32,
    pub tcp_send_buffer_bytes: u32,
    pub bitrate_table: BitrateTable,
}

pub struct RtspServerConfig {
    pub address: SocketAddr,
}

const RTSP_IP_ENV: &str = "WFD_RTSP_ADDRESS";
const RTSP_PORT_ENV: &str = "WFD_RTSP_PORT";
const UIBC_PORT_ENV: &str = "WFD_UIBC_PORT";
const RTCP_FEEDBACK_PORT_ENV: &str = "WFD_RTCP_FEEDBACK_PORT";
const SESSION_TIMEOUT_ENV: &str = "WFD_SESSION_TIMEOUT_SECS";
const RETENTION_RING_CAPACITY_ENV: &str = "WFD_RETENTION_RING_CAPACITY";
const MAX_RESEND_MULTIPLICITY_ENV: &str = "WFD_MAX_RESEND_MULTIPLICITY";

const DEFAULT_RTSP_PORT: u16 = 7236;
const DEFAULT_UIBC_PORT: u16 = 19005;
const DEFAULT_RTCP_FEEDBACK_PORT: u16 = 19121;
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETENTION_RING_CAPACITY: usize = 4096;
const DEFAULT_MAX_RESEND_MULTIPLICITY: u32 = 3;
const DEFAULT_UDP_RECV_BUFFER_BYTES: u32 = 0x8_0000;
const DEFAULT_TCP_SEND_BUFFER_BYTES: u32 = 1024 * 1024;

impl Config {
    pub fn initialize() -> Self {
        let rtsp_ip = std::env::var(RTSP_IP_ENV)
            .ok()
            .map(|v| IpAddr::from_str(&v).unwrap_or_else(|_| panic!("{RTSP_IP_ENV} should be a valid IPAddr")))
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let rtsp_port = env_u16(RTSP_PORT_ENV, DEFAULT_RTSP_PORT);

        Config {
            rtsp_server: RtspServerConfig { address: SocketAddr::new(rtsp_ip, rtsp_port) },
            uibc_port: env_u16(UIBC_PORT_ENV, DEFAULT_UIBC_PORT),
            rtcp_feedback_port: env_u16(RTCP_FEEDBACK_PORT_ENV, DEFAULT_RTCP_FEEDBACK_PORT),
            session_timeout: Duration::from_secs(env_u64(SESSION_TIMEOUT_ENV, DEFAULT_SESSION_TIMEOUT_SECS)),
            retention_ring_capacity: env_usize(RETENTION_RING_CAPACITY_ENV, DEFAULT_RETENTION_RING_CAPACITY),
            max_resend_multiplicity: env_u32(MAX_RESEND_MULTIPLICITY_ENV, DEFAULT_MAX_RESEND_MULTIPLICITY),
            resend_loss_update_window: Duration::from_secs(1),
            udp_recv_buffer_bytes: DEFAULT_UDP_RECV_BUFFER_BYTES,
            tcp_send_buffer_bytes: DEFAULT_TCP_SEND_BUFFER_BYTES,
            bitrate_table: BitrateTable::default(),
        }
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

pub fn get_global_config() -> &'static Config {
    GLOBAL_CONFIG.get_or_init(Config::initialize)
}
