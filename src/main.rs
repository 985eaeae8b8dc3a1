use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, trace, warn};
use rtcp::Unmarshall;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};

use crate::config::get_global_config;
use crate::encoder::NoopEncoder;
use crate::error::{CloseReason, SessionError};
use crate::hdcp::NoHdcp;
use crate::keepalive::KeepaliveHandle;
use crate::muxer::NullMuxer;
use crate::retransmitter::RetransmitterHandle;
use crate::rtp_packet::RtpPacket;
use crate::rtp_session::{RtpSession, RtpSessionConfig};
use crate::rtsp::{Method, RtspConnection, RtspFrame, RtspRequest, RtspResponse};
use crate::session::Session;
use crate::uibc::parse_frame;
use crate::wfd_session::{OurCapabilities, SessionState, WfdSession, WfdSessionConfig};

mod bitrate;
mod config;
mod encoder;
mod error;
mod hdcp;
mod keepalive;
mod muxer;
mod retention_ring;
mod retransmitter;
mod rtp_packet;
mod rtp_session;
mod rtsp;
mod session;
mod transport_switch;
mod uibc;
mod wfd_session;

/// Handed from the keep-alive watchdog's plain-closure callbacks back into
/// the async I/O loop, which is the only place allowed to touch the socket.
enum WatchdogEvent {
    SendProbe,
    Expired,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = get_global_config();
    let listener = match TcpListener::bind(config.rtsp_server.address).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(target: "Main", "Failed to bind RTSP listener on {}: {err}", config.rtsp_server.address);
            return;
        }
    };
    info!(target: "Main", "Listening for WFD sink connections on {}", config.rtsp_server.address);

    tokio::task::spawn(run_uibc_listener(config.uibc_port));

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(target: "Main", "Accept failed: {err}");
                continue;
            }
        };
        info!(target: "Main", "Accepted RTSP control connection from {remote}");

        match run_session(stream, remote.ip()).await {
            Ok(()) => debug!(target: "Main", "Session with {remote} ended cleanly"),
            Err(err) => warn!(target: "Main", "Session with {remote} ended with error: {err}"),
        }
    }
}

/// Our default advertised capability set. A real deployment would source this
/// from a display/audio sink collaborator (out of scope per section 1); this
/// default is a 1080p30/AAC-stereo source with no HDCP or UIBC, which is
/// enough to complete negotiation end to end.
fn default_capabilities() -> OurCapabilities {
    OurCapabilities {
        audio_codecs: vec![wfdparams::AudioCodecEntry { codec: wfdparams::AudioCodec::Aac, mode_bitmap: 0x01, latency: 0 }],
        cea_support: 1 << 5,
        hdcp_port: None,
        uibc_supported: false,
    }
}

/// Drives one sink's control connection end to end: negotiation (M1-M5),
/// then the steady-state loop handling sink-initiated requests, timer-driven
/// RTCP/keep-alive, and the interleaved data channel, until TEARDOWN or a
/// fatal error.
async fn run_session(stream: TcpStream, remote_ip: IpAddr) -> Result<(), SessionError> {
    let config = get_global_config();
    let mut conn = RtspConnection::new(stream);

    let mut wfd = WfdSession::new(WfdSessionConfig { capabilities: default_capabilities(), session_timeout: config.session_timeout });
    negotiate(&mut conn, &mut wfd).await?;

    let rtp = RtpSession::new(
        RtpSessionConfig {
            our_ssrc: rand::random(),
            favor_new: true,
            bandwidth_bytes_per_sec: 2_000_000.0,
            source_timeout: config.session_timeout,
            bye_timeout: Duration::from_secs(5),
            video_clock_rate: 90_000,
        },
        Instant::now(),
    );

    let mut session = Session::new(wfd, rtp, Box::new(NoopEncoder::default()), Box::new(NullMuxer), Box::new(NoHdcp));

    let (watchdog_tx, mut watchdog_rx) = mpsc::unbounded_channel::<WatchdogEvent>();
    let probe_tx = watchdog_tx.clone();
    let expiry_tx = watchdog_tx;
    session.keepalive = Some(KeepaliveHandle::new(
        config.session_timeout,
        move || {
            probe_tx.send(WatchdogEvent::SendProbe).ok();
        },
        move || {
            expiry_tx.send(WatchdogEvent::Expired).ok();
        },
    ));
    session.retransmitter = Some(RetransmitterHandle::new(config.retention_ring_capacity, config.max_resend_multiplicity, |_packet| {
        // Resent packets are handed to the active transport's send path once
        // a transport is live; wiring that callback through is the transport
        // switcher's job (section 4.G), not the retransmitter's.
    }));
    session.start_media(config);

    let mut rtcp_ticker = interval(Duration::from_secs(5));

    loop {
        if session.wfd.state == SessionState::Closed {
            return Ok(());
        }

        tokio::select! {
            frame = conn.read_frame() => {
                match frame.map_err(|_| SessionError::TransportFailure(crate::error::TransportFailureError::ReadError))? {
                    Some(RtspFrame::Request(request)) => {
                        handle_request(&mut conn, &mut session, &request).await?;
                    }
                    Some(RtspFrame::Response(response)) => {
                        handle_response(&mut session, &response);
                    }
                    Some(RtspFrame::Interleaved { channel, payload }) => {
                        handle_interleaved(&mut session, channel, payload, remote_ip);
                    }
                    None => {
                        debug!(target: "Main", "RTSP connection closed by {remote_ip}");
                        return Ok(());
                    }
                }
            }
            _ = rtcp_ticker.tick() => {
                let now = Instant::now();
                let ntp64 = ntp64_now();
                for (packet, _is_sr) in session.on_timer(now, ntp64) {
                    trace!(target: "Main", "Emitting {} bytes of scheduled RTCP", packet.len());
                }
            }
            Some(event) = watchdog_rx.recv() => match event {
                WatchdogEvent::SendProbe => {
                    let req = session.wfd.build_keepalive_request();
                    if let Err(err) = conn.write_request(&req).await {
                        warn!(target: "Main", "Failed to send keep-alive probe to {remote_ip}: {err}");
                    }
                }
                WatchdogEvent::Expired => {
                    warn!(target: "Main", "Keep-alive timed out for {remote_ip}, closing session");
                    let _ = session.close(CloseReason::KeepAliveTimeout);
                    return Ok(());
                }
            }
        }
    }
}

/// M1 through M5: source-initiated OPTIONS probe, capability exchange,
/// selection commit, and the trigger handing SETUP back to the sink. These
/// happen strictly in order before anything else touches the connection, so
/// they're driven as a plain sequential request/response exchange rather than
/// through the steady-state `select!` loop.
async fn negotiate(conn: &mut RtspConnection, wfd: &mut WfdSession) -> Result<(), SessionError> {
    let m1 = wfd.build_m1_options();
    conn.write_request(&m1).await.map_err(|_| SessionError::TransportFailure(crate::error::TransportFailureError::WriteError))?;
    let m1_response = expect_response(conn).await?;
    wfd.handle_m1_response(&m1_response)?;

    let m3 = wfd.build_m3_request();
    conn.write_request(&m3).await.map_err(|_| SessionError::TransportFailure(crate::error::TransportFailureError::WriteError))?;
    let m3_response = expect_response(conn).await?;
    wfd.handle_m3_response(&m3_response)?;

    wfd.negotiate()?;

    let m4 = wfd.build_m4_request()?;
    conn.write_request(&m4).await.map_err(|_| SessionError::TransportFailure(crate::error::TransportFailureError::WriteError))?;
    expect_response(conn).await?;

    let m5 = wfd.build_m5_trigger_setup();
    conn.write_request(&m5).await.map_err(|_| SessionError::TransportFailure(crate::error::TransportFailureError::WriteError))?;
    expect_response(conn).await?;

    Ok(())
}

async fn expect_response(conn: &mut RtspConnection) -> Result<RtspResponse, SessionError> {
    loop {
        match conn.read_frame().await.map_err(|_| SessionError::TransportFailure(crate::error::TransportFailureError::ReadError))? {
            Some(RtspFrame::Response(response)) => return Ok(response),
            Some(_) => continue,
            None => return Err(SessionError::TransportFailure(crate::error::TransportFailureError::Closed)),
        }
    }
}

/// Dispatches a sink-initiated request: M2's symmetric OPTIONS, SETUP,
/// PLAY, PAUSE, TEARDOWN, or a standby toggle, replying on the same
/// connection.
async fn handle_request(conn: &mut RtspConnection, session: &mut Session, request: &RtspRequest) -> Result<(), SessionError> {
    let response = match request.method {
        Method::Options => session.wfd.build_m2_response(request),
        Method::Setup => session.wfd.handle_setup_request(request)?,
        Method::Play => {
            let response = session.wfd.handle_play_request(request)?;
            session.start_media(get_global_config());
            response
        }
        Method::Pause => session.wfd.handle_pause_request(request)?,
        Method::Teardown => {
            let response = session.wfd.handle_teardown_request(request);
            let _ = session.close(CloseReason::Teardown);
            response
        }
        Method::SetParameter => {
            let standby = request.body.as_deref().and_then(|body| wfdparams::ParameterSet::parse(body).ok()).and_then(|params| params.standby);
            match standby {
                Some(on) => session.wfd.handle_standby_request(request, on),
                None => RtspResponse::ok(request.cseq),
            }
        }
        Method::GetParameter => RtspResponse::ok(request.cseq),
    };
    conn.write_response(&response).await.map_err(|_| SessionError::TransportFailure(crate::error::TransportFailureError::WriteError))
}

/// A response to a source-initiated request sent outside `negotiate` (the
/// periodic keep-alive probe, or an M12/M13 trigger); clears the keep-alive
/// watchdog's pending flag on any 200 OK.
fn handle_response(session: &mut Session, response: &RtspResponse) {
    if response.status == 200 {
        if let Some(keepalive) = &session.keepalive {
            keepalive.notify_response();
        }
    }
}

/// Demultiplexes one interleaved data-channel frame: even channels carry RTP,
/// odd channels carry RTCP, per the conventional RTSP interleave pairing this
/// engine advertises in `wfd_client_rtp_ports`.
fn handle_interleaved(session: &mut Session, channel: u8, payload: Bytes, remote_ip: IpAddr) {
    let now = Instant::now();
    if channel % 2 == 0 {
        match RtpPacket::unmarshall(payload) {
            Ok(packet) => {
                if let Err(err) = session.on_rtp(&packet, remote_ip, now) {
                    trace!(target: "Main", "Dropping invalid RTP packet from {remote_ip}: {err:?}");
                }
            }
            Err(err) => trace!(target: "Main", "Dropping unparseable RTP frame from {remote_ip}: {err:?}"),
        }
    } else {
        let ntp64 = ntp64_now();
        if let Err(err) = session.on_rtcp(payload, now, ntp64) {
            trace!(target: "Main", "Dropping invalid RTCP compound packet from {remote_ip}: {err:?}");
        }
    }
}

/// The UIBC back-channel listener (section 5: "one UIBC listener thread accepts
/// and reads a TCP stream decoded as framed UIBC messages"). Runs for the
/// lifetime of the process, independent of any one sink's RTSP connection.
/// Decoding the event payload further is out of scope (section 1); frames are
/// only logged here.
async fn run_uibc_listener(port: u16) {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(target: "Uibc", "Failed to bind UIBC listener on port {port}: {err}");
            return;
        }
    };
    info!(target: "Uibc", "Listening for UIBC input connections on port {port}");

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(target: "Uibc", "UIBC accept failed: {err}");
                continue;
            }
        };
        tokio::task::spawn(read_uibc_frames(stream, remote.ip()));
    }
}

async fn read_uibc_frames(mut stream: TcpStream, remote_ip: IpAddr) {
    use tokio::io::AsyncReadExt;

    let mut header = [0u8; 3];
    loop {
        if stream.read_exact(&mut header[..1]).await.is_err() {
            return;
        }
        if stream.read_exact(&mut header[1..3]).await.is_err() {
            return;
        }
        let length = u16::from_be_bytes([header[1], header[2]]) as usize;
        let mut payload = vec![0u8; length];
        if stream.read_exact(&mut payload).await.is_err() {
            return;
        }

        let mut frame_bytes = Vec::with_capacity(3 + length);
        frame_bytes.extend_from_slice(&header);
        frame_bytes.extend_from_slice(&payload);

        match parse_frame(Bytes::from(frame_bytes)) {
            Ok(frame) => trace!(target: "Uibc", "Received UIBC frame from {remote_ip}: type={} len={}", frame.event_type, frame.payload.len()),
            Err(err) => trace!(target: "Uibc", "Dropping malformed UIBC frame from {remote_ip}: {err:?}"),
        }
    }
}

/// Wall-clock time as a 64-bit NTP timestamp (32.32 fixed point, epoch 1900),
/// used to stamp sender reports. The NTP epoch offset is the standard 70
/// years' worth of seconds between 1900-01-01 and the Unix epoch.
const NTP_UNIX_EPOCH_OFFSET_SECS: u64 = 2_208_988_800;

fn ntp64_now() -> u64 {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    let seconds = now.as_secs() + NTP_UNIX_EPOCH_OFFSET_SECS;
    let fraction = ((now.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (seconds << 32) | fraction
}
