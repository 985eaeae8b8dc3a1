use bytes::{BufMut, Bytes, BytesMut};

/// Fixed-capacity power-of-two array indexed by `seq & (capacity - 1)`, holding
/// the last N transmitted RTP packets for sink-requested retransmission.
/// `insert` never blocks and never fails on capacity; the previous occupant of
/// a slot is simply overwritten on wrap-around.
pub struct RetentionRing {
    slots: Vec<Slot>,
    mask: u16,
    resend_seqnum: u16,
    packets_resend: u32,
}

#[derive(Clone)]
enum Slot {
    Empty,
    Occupied { seq: u16, packet: Bytes },
}

pub static DEFAULT_CAPACITY: usize = 4096;

impl RetentionRing {
    /// `capacity` must be a power of two drawn from {1024, ..., 65536}.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "retention ring capacity must be a power of two");
        Self {
            slots: vec![Slot::Empty; capacity],
            mask: (capacity - 1) as u16,
            resend_seqnum: 0,
            packets_resend: 0,
        }
    }

    pub fn insert(&mut self, seq: u16, packet: Bytes) {
        let index = (seq & self.mask) as usize;
        self.slots[index] = Slot::Occupied { seq, packet };
    }

    /// Returns a resend-framed packet: the 12-byte RTP header is copied with
    /// its sequence number field (bytes `2..4`) overwritten by a fresh resend
    /// sequence number, followed by the original sequence number as an OSN at
    /// bytes `12..14`, followed by the full original payload, per the
    /// retransmission wire format in section 4.C. Returns `None` if the slot
    /// has been overwritten, was never populated, or holds a different
    /// sequence number than requested.
    pub fn extract(&mut self, seq: u16) -> Option<(u16, Bytes)> {
        let index = (seq & self.mask) as usize;
        let Slot::Occupied { seq: stored_seq, packet } = &self.slots[index] else {
            return None;
        };
        if *stored_seq != seq {
            return None;
        }
        if packet.len() < 12 {
            return None;
        }

        self.resend_seqnum = self.resend_seqnum.wrapping_add(1);
        let resend_seq = self.resend_seqnum;

        let mut out = BytesMut::with_capacity(packet.len() + 2);
        out.extend_from_slice(&packet[..12]);
        out[2..4].copy_from_slice(&resend_seq.to_be_bytes());
        out.extend_from_slice(&seq.to_be_bytes());
        out.extend_from_slice(&packet[12..]);

        self.packets_resend += 1;
        Some((resend_seq, out.freeze()))
    }

    pub fn packets_resend(&self) -> u32 {
        self.packets_resend
    }
}

impl Default for RetentionRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod retention_ring {
    use bytes::Bytes;

    use super::RetentionRing;

    fn sample_packet(seq: u16) -> Bytes {
        let mut bytes = vec![0u8; 16];
        bytes[2..4].copy_from_slice(&seq.to_be_bytes());
        Bytes::from(bytes)
    }

    #[test]
    fn inserts_and_extracts_same_slot() {
        let mut ring = RetentionRing::new(128);
        ring.insert(5, sample_packet(5));

        let (_, packet) = ring.extract(5).unwrap();

        assert_eq!(&packet[12..14], &5u16.to_be_bytes());
    }

    #[test]
    fn extract_misses_on_empty_slot() {
        let mut ring = RetentionRing::new(128);

        assert!(ring.extract(5).is_none());
    }

    #[test]
    fn evicts_overflow_members() {
        let mut ring = RetentionRing::new(128);
        ring.insert(5, sample_packet(5));
        // Same slot as seq 5 (5 mod 128 == 133 mod 128)
        ring.insert(133, sample_packet(133));

        assert!(ring.extract(5).is_none());
        let (_, packet) = ring.extract(133).unwrap();
        assert_eq!(&packet[12..14], &133u16.to_be_bytes());
    }

    #[test]
    fn tracks_packets_resend_counter() {
        let mut ring = RetentionRing::new(128);
        ring.insert(1, sample_packet(1));
        ring.insert(2, sample_packet(2));

        ring.extract(1);
        ring.extract(2);

        assert_eq!(ring.packets_resend(), 2);
    }

    #[test]
    fn resend_seqnum_increments_across_extracts() {
        let mut ring = RetentionRing::new(128);
        ring.insert(1, sample_packet(1));
        ring.insert(2, sample_packet(2));

        let (first_resend, _) = ring.extract(1).unwrap();
        let (second_resend, _) = ring.extract(2).unwrap();

        assert_eq!(second_resend, first_resend.wrapping_add(1));
    }
}
