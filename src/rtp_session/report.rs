use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rtcp::{Chunk, CNameSDES, FirEntry, FullIntraRequest, PayloadSpecificFeedback, PictureLossIndication, GenericNACK, ReportBlock, SDES, SenderInfo, SourceDescriptor, TransportLayerNACK};

use super::source::{Source, SourceId};

/// NTP epoch (1900-01-01) is 70 years before the Unix epoch, in seconds,
/// including the 17 leap days in that span.
const NTP_UNIX_EPOCH_OFFSET_SECS: u64 = 2_208_988_800;

pub fn ntp64_now() -> u64 {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let seconds = since_epoch.as_secs() + NTP_UNIX_EPOCH_OFFSET_SECS;
    let fraction = ((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (seconds << 32) | fraction
}

pub fn ntp_middle_bits(ntp64: u64) -> u32 {
    ((ntp64 >> 16) & 0xFFFF_FFFF) as u32
}

/// Builds the sender-info block for our own internal source.
pub fn build_sender_info(sender_ssrc: u32, packet_count: u32, octet_count: u32, rtp_timestamp: u32, ntp64: u64) -> SenderInfo {
    SenderInfo {
        sender_ssrc,
        ntp_timestamp: ntp64,
        rtp_timestamp,
        sender_packet_count: packet_count,
        sender_octet_count: octet_count,
    }
}

/// Builds one report block for a foreign source, per section 4.D's RTCP
/// content rules: fraction-lost, cumulative-lost (24 bits), extended highest
/// sequence, jitter, LSR (middle 32 bits of the remote's last SR NTP), and
/// DLSR (elapsed time since that LSR, in 1/65536 s units).
pub fn build_report_block(source: &mut Source, now: Instant) -> ReportBlock {
    let fraction_lost = source.fraction_lost_since_last_report();
    let cumulative_packets_lost = source.stats.cumulative_lost() & 0x00FF_FFFF;
    let ext_highest_sequence = source.stats.extended_highest_seq();

    let dlsr = match source.last_sr_received_at {
        Some(received_at) => {
            let elapsed = now.saturating_duration_since(received_at);
            ((elapsed.as_secs_f64() * 65536.0) as u32).min(u32::MAX)
        }
        None => 0,
    };

    ReportBlock {
        ssrc: source.ssrc,
        fraction_lost,
        cumulative_packets_lost,
        ext_highest_sequence,
        jitter: source.jitter,
        lsr: source.last_sr_ntp_middle,
        dlsr,
    }
}

/// Selects up to 31 foreign senders eligible for a report block: validated
/// (past probation), sending, and not yet BYE'd.
pub fn eligible_report_sources<'a>(
    sources: impl Iterator<Item = (SourceId, &'a mut Source)>,
    internal: SourceId,
) -> Vec<(SourceId, &'a mut Source)> {
    sources
        .filter(|(id, source)| *id != internal && source.validated && source.is_sender && source.bye_marked.is_none())
        .take(31)
        .collect()
}

pub fn build_bye(ssrcs: Vec<u32>, reason: Option<String>) -> rtcp::Bye {
    rtcp::Bye::new(ssrcs, reason)
}

/// Builds a one-chunk SDES packet for our own SSRC, always including CNAME
/// per section 4.D.
pub fn build_sdes(ssrc: u32, items: &std::collections::HashMap<String, String>) -> SourceDescriptor {
    let cname = items.get("cname").cloned().unwrap_or_default();
    SourceDescriptor::new(vec![Chunk::new(ssrc, vec![SDES::CName(CNameSDES::new(cname))])])
}

pub fn build_generic_nack(sender_ssrc: u32, media_ssrc: u32, seqs: &[u16]) -> Option<TransportLayerNACK> {
    if seqs.is_empty() {
        return None;
    }

    let mut sorted = seqs.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut entries = vec![];
    let mut i = 0;
    while i < sorted.len() {
        let pid = sorted[i];
        let mut blp: u16 = 0;
        let mut j = i + 1;
        while j < sorted.len() {
            let delta = sorted[j].wrapping_sub(pid);
            if delta == 0 || delta > 16 {
                break;
            }
            blp |= 1 << (delta - 1);
            j += 1;
        }
        entries.push(GenericNACK { pid, blp });
        i = j;
    }

    Some(TransportLayerNACK::new(entries, sender_ssrc, media_ssrc))
}

pub fn build_pli(sender_ssrc: u32, media_ssrc: u32) -> PayloadSpecificFeedback {
    PayloadSpecificFeedback::PictureLossIndication(PictureLossIndication::new(sender_ssrc, media_ssrc))
}

pub fn build_fir(sender_ssrc: u32, media_ssrc: u32, seq_nr: u8) -> PayloadSpecificFeedback {
    PayloadSpecificFeedback::FullIntraRequest(FullIntraRequest::new(
        sender_ssrc,
        media_ssrc,
        vec![FirEntry { ssrc: media_ssrc, seq_nr }],
    ))
}


#[cfg(test)]
mod generic_nack {
    use super::build_generic_nack;

    #[test]
    fn single_run_collapses_into_one_entry() {
        let nack = build_generic_nack(1, 2, &[150, 151, 152]).unwrap();
        assert_eq!(nack.nacks.len(), 1);
        assert_eq!(nack.nacks[0].pid, 150);
        assert_eq!(nack.nacks[0].blp, 0b0000_0000_0000_0011);
    }

    #[test]
    fn empty_input_yields_none() {
        assert!(build_generic_nack(1, 2, &[]).is_none());
    }

    #[test]
    fn far_apart_seqs_split_into_separate_entries() {
        let nack = build_generic_nack(1, 2, &[10, 200]).unwrap();
        assert_eq!(nack.nacks.len(), 2);
    }
}
