//! Ogg page framer for Vorbis (§4.D, "Ogg Vorbis").
//!
//! Independent of whichever engine produced the raw Vorbis packets (see
//! `vorbis.rs`). Tested against the exact page layout and CRC algorithm
//! from §4.D / §8 scenario 2.

const CRC_POLY: u32 = 0x04C11DB7;

fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc32_ogg(data: &[u8], table: &[u32; 256]) -> u32 {
    let mut crc: u32 = 0;
    for &byte in data {
        let top = (crc >> 24) as u8;
        crc = (crc << 8) ^ table[(top ^ byte) as usize];
    }
    crc
}

/// One already-segmented Ogg page, ready to write to the sink.
pub struct OggPage {
    pub bytes: Vec<u8>,
}

/// Parsed Vorbis setup blob: identification, comment, and setup packets
/// (§4.D: "parses the three Vorbis setup headers from the
/// codec-description blob").
pub struct VorbisHeaders {
    pub identification: Vec<u8>,
    pub comment: Vec<u8>,
    pub setup: Vec<u8>,
}

/// Parses the codec-description blob: `u16 numHeaders-1`, then
/// `numHeaders-1` `u16` lengths, then concatenated payloads. For Vorbis
/// `numHeaders` is always 3.
pub fn parse_header_blob(blob: &[u8]) -> Option<VorbisHeaders> {
    if blob.len() < 2 {
        return None;
    }
    let num_headers_minus_one = u16::from_le_bytes([blob[0], blob[1]]) as usize;
    if num_headers_minus_one != 2 {
        return None;
    }
    let lengths_start = 2;
    let lengths_end = lengths_start + num_headers_minus_one * 2;
    if blob.len() < lengths_end {
        return None;
    }
    let len0 = u16::from_le_bytes([blob[lengths_start], blob[lengths_start + 1]]) as usize;
    let len1 =
        u16::from_le_bytes([blob[lengths_start + 2], blob[lengths_start + 3]]) as usize;

    let payload_start = lengths_end;
    let identification_end = payload_start + len0;
    let comment_end = identification_end + len1;
    if blob.len() < comment_end {
        return None;
    }

    Some(VorbisHeaders {
        identification: blob[payload_start..identification_end].to_vec(),
        comment: blob[identification_end..comment_end].to_vec(),
        setup: blob[comment_end..].to_vec(),
    })
}

/// Page header flags (Ogg spec).
#[allow(dead_code)]
mod flags {
    pub const CONTINUED: u8 = 0x01;
    pub const BOS: u8 = 0x02;
    pub const EOS: u8 = 0x04;
}

/// Splits an already-muxed Ogg bitstream (as produced by a full-container
/// codec library) back into its elementary packets, reassembling packets
/// that span a page boundary via the standard lacing-value continuation
/// rule (a segment value of 255 means "more of this packet follows").
///
/// Used by the Vorbis engine (`vorbis.rs`) to recover raw packets from
/// `vorbis_rs`'s self-contained per-block Ogg output so they can be
/// re-framed through this crate's own [`OggFramer`] instead of forwarding
/// someone else's page headers and CRCs verbatim.
pub fn demux_packets(data: &[u8]) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut current = Vec::new();
    let mut pos = 0usize;

    while pos + 27 <= data.len() && &data[pos..pos + 4] == b"OggS" {
        let page_segments = data[pos + 26] as usize;
        let seg_table_start = pos + 27;
        if seg_table_start + page_segments > data.len() {
            break;
        }
        let seg_table = &data[seg_table_start..seg_table_start + page_segments];
        let mut body_pos = seg_table_start + page_segments;

        let mut i = 0;
        while i < seg_table.len() {
            let mut packet_len = 0usize;
            let mut ran_full_255 = false;
            loop {
                let seg = seg_table[i] as usize;
                packet_len += seg;
                i += 1;
                ran_full_255 = seg == 255;
                if !ran_full_255 || i >= seg_table.len() {
                    break;
                }
            }
            current.extend_from_slice(&data[body_pos..body_pos + packet_len]);
            body_pos += packet_len;

            let continues_on_next_page = ran_full_255 && i == seg_table.len();
            if !continues_on_next_page {
                packets.push(std::mem::take(&mut current));
            }
        }
        pos = body_pos;
    }

    packets
}

/// Builds, sequences, and CRCs Ogg pages for one Vorbis logical stream.
pub struct OggFramer {
    serial_number: u32,
    page_sequence: u32,
    granule_position: u64,
    headers_sent: bool,
    sample_rate: u32,
    crc_table: [u32; 256],
}

impl OggFramer {
    pub fn new(serial_number: u32, sample_rate: u32) -> Self {
        Self {
            serial_number,
            page_sequence: 0,
            granule_position: 0,
            headers_sent: false,
            sample_rate,
            crc_table: build_crc_table(),
        }
    }

    /// Emits the BOS identification page and the comment+setup page, in
    /// that order, the first time it is called (§4.D).
    pub fn emit_headers(&mut self, headers: &VorbisHeaders) -> Vec<OggPage> {
        if self.headers_sent {
            return Vec::new();
        }
        self.headers_sent = true;

        let bos = self.build_page(&[&headers.identification], flags::BOS, 0);
        let setup_page = self.build_page(&[&headers.comment, &headers.setup], 0, 0);
        vec![bos, setup_page]
    }

    /// Emits one audio page for `packet`, advancing the granule position by
    /// `duration_micros` worth of samples at the framer's sample rate.
    pub fn emit_audio_packet(&mut self, packet: &[u8], duration_micros: u64) -> OggPage {
        let samples = (duration_micros * self.sample_rate as u64) / 1_000_000;
        self.granule_position += samples;
        self.build_page(&[packet], 0, self.granule_position)
    }

    pub fn reset(&mut self) {
        self.headers_sent = false;
        self.page_sequence = 0;
        self.granule_position = 0;
    }

    fn build_page(&mut self, packets: &[&[u8]], header_flags: u8, granule: u64) -> OggPage {
        let mut segments: Vec<u8> = Vec::new();
        let mut body: Vec<u8> = Vec::new();
        for packet in packets {
            let mut remaining = packet.len();
            while remaining >= 255 {
                segments.push(255);
                remaining -= 255;
            }
            segments.push(remaining as u8);
            body.extend_from_slice(packet);
        }

        let mut page = Vec::with_capacity(27 + segments.len() + body.len());
        page.extend_from_slice(b"OggS");
        page.push(0); // version
        page.push(header_flags);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&self.serial_number.to_le_bytes());
        page.extend_from_slice(&self.page_sequence.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes()); // CRC placeholder
        page.push(segments.len() as u8);
        page.extend_from_slice(&segments);
        page.extend_from_slice(&body);

        let crc = crc32_ogg(&page, &self.crc_table);
        page[22..26].copy_from_slice(&crc.to_le_bytes());

        self.page_sequence += 1;
        OggPage { bytes: page }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_headers() -> VorbisHeaders {
        VorbisHeaders {
            identification: vec![1, 2, 3, 4],
            comment: vec![5, 6],
            setup: vec![7, 8, 9],
        }
    }

    #[test]
    fn first_page_is_bos_with_granule_zero() {
        let mut framer = OggFramer::new(0x1234, 48000);
        let pages = framer.emit_headers(&sample_headers());
        assert_eq!(pages.len(), 2);

        let bos = &pages[0].bytes;
        assert_eq!(&bos[0..4], b"OggS");
        assert_eq!(bos[5], 0x02, "first page must carry the BOS flag");
        let granule = u64::from_le_bytes(bos[6..14].try_into().unwrap());
        assert_eq!(granule, 0);
    }

    #[test]
    fn serial_number_is_stable_across_pages() {
        let mut framer = OggFramer::new(0xCAFEBABE, 48000);
        let pages = framer.emit_headers(&sample_headers());
        for page in &pages {
            let serial = u32::from_le_bytes(page.bytes[14..18].try_into().unwrap());
            assert_eq!(serial, 0xCAFEBABE);
        }
    }

    #[test]
    fn page_sequence_increments() {
        let mut framer = OggFramer::new(1, 48000);
        let pages = framer.emit_headers(&sample_headers());
        let seq0 = u32::from_le_bytes(pages[0].bytes[18..22].try_into().unwrap());
        let seq1 = u32::from_le_bytes(pages[1].bytes[18..22].try_into().unwrap());
        assert_eq!(seq0, 0);
        assert_eq!(seq1, 1);
    }

    #[test]
    fn emit_headers_is_idempotent() {
        let mut framer = OggFramer::new(1, 48000);
        let headers = sample_headers();
        assert_eq!(framer.emit_headers(&headers).len(), 2);
        assert!(framer.emit_headers(&headers).is_empty());
    }

    #[test]
    fn audio_packet_advances_granule_position() {
        let mut framer = OggFramer::new(1, 48000);
        framer.emit_headers(&sample_headers());
        let page = framer.emit_audio_packet(&[1, 2, 3], 20_000);
        let granule = u64::from_le_bytes(page.bytes[6..14].try_into().unwrap());
        assert_eq!(granule, 960); // 48000 * 20ms
    }

    #[test]
    fn segment_table_splits_runs_of_255() {
        let mut framer = OggFramer::new(1, 48000);
        let packet = vec![0u8; 600];
        let page = framer.emit_audio_packet(&packet, 0);
        let segment_count = page.bytes[26] as usize;
        // 600 = 255 + 255 + 90 -> three segments.
        assert_eq!(segment_count, 3);
    }

    #[test]
    fn parse_header_blob_round_trips() {
        let headers = sample_headers();
        let mut blob = Vec::new();
        blob.extend_from_slice(&2u16.to_le_bytes());
        blob.extend_from_slice(&(headers.identification.len() as u16).to_le_bytes());
        blob.extend_from_slice(&(headers.comment.len() as u16).to_le_bytes());
        blob.extend_from_slice(&headers.identification);
        blob.extend_from_slice(&headers.comment);
        blob.extend_from_slice(&headers.setup);

        let parsed = parse_header_blob(&blob).expect("valid blob");
        assert_eq!(parsed.identification, headers.identification);
        assert_eq!(parsed.comment, headers.comment);
        assert_eq!(parsed.setup, headers.setup);
    }

    #[test]
    fn demux_packets_recovers_packets_written_by_build_page() {
        let mut framer = OggFramer::new(1, 48000);
        let headers = sample_headers();
        let pages = framer.emit_headers(&headers);
        let mut muxed = Vec::new();
        for page in &pages {
            muxed.extend_from_slice(&page.bytes);
        }

        let packets = demux_packets(&muxed);
        // page 0 carries one packet (identification), page 1 carries two
        // (comment, setup).
        assert_eq!(packets, vec![headers.identification, headers.comment, headers.setup]);
    }

    #[test]
    fn demux_packets_reassembles_packet_spanning_255_byte_segment() {
        let mut framer = OggFramer::new(1, 48000);
        let packet = vec![7u8; 600]; // spans three 255/255/90 segments
        let page = framer.emit_audio_packet(&packet, 0);

        let packets = demux_packets(&page.bytes);
        assert_eq!(packets, vec![packet]);
    }

    #[test]
    fn reset_clears_sequence_and_granule() {
        let mut framer = OggFramer::new(1, 48000);
        framer.emit_headers(&sample_headers());
        framer.emit_audio_packet(&[1, 2, 3], 20_000);
        framer.reset();
        assert_eq!(framer.page_sequence, 0);
        assert_eq!(framer.granule_position, 0);
        assert!(!framer.headers_sent);
    }
}
