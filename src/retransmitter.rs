use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::trace;
use rtcp::GenericNACK;

use crate::retention_ring::RetentionRing;

type Sender = tokio::sync::mpsc::UnboundedSender<Message>;
type Receiver = tokio::sync::mpsc::UnboundedReceiver<Message>;

pub enum Message {
    RegisterSent { seq: u16, packet: Bytes },
    Nack { pid: u16, blp: u16 },
    SetResendMultiplicity(u32),
}

/// Sits between the payloader and the socket, per section 4.I: records every
/// outgoing RTP packet in the retention ring, and on an incoming RTPFB NACK
/// extracts and resends whichever of the requested sequences are still held.
/// The caller (the session's I/O loop) owns deciding the resend multiplicity
/// from recent aggregate loss and updates it via `SetResendMultiplicity`.
struct RetransmitterActor {
    receiver: Receiver,
    ring: RetentionRing,
    resend_multiplicity: u32,
    max_resend_multiplicity: u32,
    last_request: Option<(u16, u16)>,
    duplicate_count: u32,
    forward: Box<dyn Fn(Bytes) + Send>,
    packets_resend: Arc<AtomicU32>,
}

impl RetransmitterActor {
    fn handle_message(&mut self, message: Message) {
        match message {
            Message::RegisterSent { seq, packet } => self.ring.insert(seq, packet),
            Message::Nack { pid, blp } => self.handle_nack(pid, blp),
            Message::SetResendMultiplicity(multiplicity) => {
                self.resend_multiplicity = multiplicity.min(self.max_resend_multiplicity);
            }
        }
    }

    /// Dongles are observed sending the same `(pid, blp)` pair three times in
    /// a row for a single real loss event; the first occurrence is acted on,
    /// the second and third are suppressed as duplicates, and a fourth
    /// identical occurrence is treated as a fresh, authoritative request.
    fn handle_nack(&mut self, pid: u16, blp: u16) {
        if self.last_request == Some((pid, blp)) {
            self.duplicate_count += 1;
        } else {
            self.last_request = Some((pid, blp));
            self.duplicate_count = 1;
        }

        if self.duplicate_count % 3 != 1 {
            trace!(target: "Retransmitter", "Suppressing NACK duplicate for pid={pid}");
            return;
        }

        for seq in requested_sequences(pid, blp) {
            for _ in 0..self.resend_multiplicity.max(1) {
                if let Some((_, packet)) = self.ring.extract(seq) {
                    self.packets_resend.fetch_add(1, Ordering::Relaxed);
                    (self.forward)(packet);
                } else {
                    break;
                }
            }
        }
    }
}

/// Decodes a generic NACK's `(pid, blp)` pair into the set of requested
/// sequence numbers: `pid` itself, plus one bit of `blp` per sequence
/// `pid + 1 ..= pid + 16` that's set.
fn requested_sequences(pid: u16, blp: u16) -> Vec<u16> {
    let mut seqs = vec![pid];
    for bit in 0..16u16 {
        if blp & (1 << bit) != 0 {
            seqs.push(pid.wrapping_add(bit + 1));
        }
    }
    seqs
}

/// Picks a resend multiplicity from recent aggregate loss, per section 4.I's
/// `≤1%: 1×, ≤2%: 2×, >2%: 3×` rule, capped at `max`.
pub fn resend_multiplicity_for_loss(fraction_lost_percent: f64, max: u32) -> u32 {
    let multiplicity = if fraction_lost_percent <= 1.0 {
        1
    } else if fraction_lost_percent <= 2.0 {
        2
    } else {
        3
    };
    multiplicity.min(max)
}

#[derive(Clone)]
pub struct RetransmitterHandle {
    pub sender: Sender,
    packets_resend: Arc<AtomicU32>,
}

impl RetransmitterHandle {
    pub fn new(ring_capacity: usize, max_resend_multiplicity: u32, forward: impl Fn(Bytes) + Send + 'static) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel::<Message>();
        let packets_resend = Arc::new(AtomicU32::new(0));
        let actor = RetransmitterActor {
            receiver,
            ring: RetentionRing::new(ring_capacity),
            resend_multiplicity: 1,
            max_resend_multiplicity,
            last_request: None,
            duplicate_count: 0,
            forward: Box::new(forward),
            packets_resend: packets_resend.clone(),
        };
        tokio::spawn(run(actor));

        Self { sender, packets_resend }
    }

    pub fn nack_from_generic(&self, nack: &GenericNACK) {
        self.sender.send(Message::Nack { pid: nack.pid, blp: nack.blp }).ok();
    }

    /// Live count of packets handed back to the forwarder across this
    /// retransmitter's lifetime, per section 4.C: the UDP rate controller
    /// cross-checks RTCP-reported loss against this counter.
    pub fn packets_resend(&self) -> u32 {
        self.packets_resend.load(Ordering::Relaxed)
    }
}

async fn run(mut actor: RetransmitterActor) {
    while let Some(msg) = actor.receiver.recv().await {
        actor.handle_message(msg);
    }
    trace!(target: "Retransmitter", "Dropping actor");
}
