use std::io;
use std::os::fd::AsRawFd;
use std::time::Duration;

use log::{debug, warn};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(20);
const ACCEPT_RETRIES: u32 = 50;
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
const TCP_SEND_BUFFER_BYTES: u32 = 1 << 20;
/// Fixed grace period for the TCP→UDP drain wait when the sink doesn't
/// support the T3 audio-report PTS-equality signal, per section 4.G.
const DRAIN_GRACE_PERIOD: Duration = Duration::from_millis(500 * 10);

pub struct UdpTransport {
    pub rtp: UdpSocket,
    pub rtcp: UdpSocket,
}

pub struct TcpTransport {
    pub stream: TcpStream,
}

pub enum ActiveTransport {
    Udp(UdpTransport),
    Tcp(TcpTransport),
}

/// Performs the UDP<->TCP transport handoffs described in section 4.G. Pure
/// socket/transport management: the caller is responsible for pausing the
/// pipeline, rewiring the payloader's send callback, and resetting the
/// encoder bitrate around each call.
pub struct TransportSwitcher {
    bind_addr: std::net::IpAddr,
}

impl TransportSwitcher {
    pub fn new(bind_addr: std::net::IpAddr) -> Self {
        Self { bind_addr }
    }

    /// Opens the even/odd UDP RTP/RTCP port pair on the negotiated base port.
    pub async fn switch_to_udp(&self, rtp_port: u16) -> io::Result<UdpTransport> {
        let rtp = UdpSocket::bind((self.bind_addr, rtp_port)).await?;
        let rtcp = UdpSocket::bind((self.bind_addr, rtp_port + 1)).await?;
        set_recv_buffer_size(&rtp, crate::config::get_global_config().udp_recv_buffer_bytes)?;
        Ok(UdpTransport { rtp, rtcp })
    }

    /// Listens on `port`, accepting within a 20s deadline and up to 50
    /// retries spaced 100ms apart, then configures the accepted stream per
    /// section 6 (`TCP_NODELAY`, `SO_SNDBUF = 1 MiB`).
    pub async fn switch_to_tcp(&self, port: u16) -> io::Result<TcpTransport> {
        let listener = TcpListener::bind((self.bind_addr, port)).await?;

        let mut attempts = 0;
        let stream = loop {
            match timeout(ACCEPT_TIMEOUT, listener.accept()).await {
                Ok(Ok((stream, remote))) => {
                    debug!(target: "TransportSwitcher", "Accepted TCP data connection from {remote}");
                    break stream;
                }
                Ok(Err(err)) => return Err(err),
                Err(_elapsed) => {
                    attempts += 1;
                    if attempts >= ACCEPT_RETRIES {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "TCP accept exhausted its retry budget"));
                    }
                    warn!(target: "TransportSwitcher", "TCP accept attempt {attempts} timed out, retrying");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        };

        stream.set_nodelay(true)?;
        set_send_buffer_size(&stream, TCP_SEND_BUFFER_BYTES)?;

        Ok(TcpTransport { stream })
    }

    /// Waits for the sink to signal it has drained the TCP path before the
    /// caller tears it down, per the TCP→UDP rule: either an explicit signal
    /// (a T3 audio report whose PTS repeats the previous sample's), or a
    /// fixed grace period if the sink never sends one.
    pub async fn wait_for_drain(&self, signal: tokio::sync::oneshot::Receiver<()>) {
        let _ = timeout(DRAIN_GRACE_PERIOD, signal).await;
    }
}

fn set_send_buffer_size(stream: &TcpStream, bytes: u32) -> io::Result<()> {
    set_buffer_size(stream.as_raw_fd(), libc::SO_SNDBUF, bytes)
}

fn set_recv_buffer_size(socket: &UdpSocket, bytes: u32) -> io::Result<()> {
    set_buffer_size(socket.as_raw_fd(), libc::SO_RCVBUF, bytes)
}

fn set_buffer_size(fd: std::os::fd::RawFd, option: libc::c_int, bytes: u32) -> io::Result<()> {
    let value = bytes as libc::c_int;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
