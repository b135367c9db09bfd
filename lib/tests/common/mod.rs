//! Programmatic byte-builder fixtures for the cross-module scenarios in
//! `integration_tests.rs`. No checked-in binary captures: the protocol is
//! simple enough to construct exactly and deterministically in code.

use xrit_demux::crc::CrcTable;
use xrit_demux::vcdu::COMS1_SCID;

pub const ZONE_LEN: usize = 884;
pub const VCDU_LEN: usize = 892;

/// Build one complete 892-byte VCDU frame carrying `zone` (padded/truncated
/// to [`ZONE_LEN`]) with the given M_PDU first-header-pointer.
pub fn build_vcdu(scid: u8, vcid: u8, counter: u32, pointer: u16, zone: &[u8]) -> Vec<u8> {
    let mut dat = vec![0u8; VCDU_LEN];
    let x: u16 = (u16::from(scid) << 6) | u16::from(vcid & 0x3f);
    dat[0..2].copy_from_slice(&x.to_be_bytes());
    let counter_bytes = counter.to_be_bytes();
    dat[2..5].copy_from_slice(&counter_bytes[1..4]);
    dat[6..8].copy_from_slice(&pointer.to_be_bytes());
    let n = zone.len().min(ZONE_LEN);
    dat[8..8 + n].copy_from_slice(&zone[..n]);
    dat
}

pub fn build_vcdu_coms1(vcid: u8, counter: u32, pointer: u16, zone: &[u8]) -> Vec<u8> {
    build_vcdu(COMS1_SCID, vcid, counter, pointer, zone)
}

/// CP_PDU header + payload + CRC-16/CCITT-FALSE trailer. The CRC and the
/// declared length both cover the payload only, not the 6-byte header —
/// matching how the channel handler validates a closed CP_PDU.
pub fn build_cppdu(apid: u16, seq: u8, counter: u16, payload: &[u8]) -> Vec<u8> {
    let len_minus_one = (payload.len() - 1) as u16;
    let mut dat = vec![0u8; 6];
    let hi: u16 = apid & 0x7ff;
    let lo: u16 = (u16::from(seq) << 14) | (counter & 0x3fff);
    dat[0..2].copy_from_slice(&hi.to_be_bytes());
    dat[2..4].copy_from_slice(&lo.to_be_bytes());
    dat[4..6].copy_from_slice(&len_minus_one.to_be_bytes());
    dat.extend_from_slice(payload);
    let crc = CrcTable::new().compute(payload);
    dat.extend_from_slice(&crc.to_be_bytes());
    dat
}

/// The distinguished EOF-marker CP_PDU (APID=0, counter=0, CONTINUE, length=1).
pub fn eof_marker() -> Vec<u8> {
    build_cppdu(0, 0, 0, &[0u8])
}

pub fn tpfile_header(counter: u16, length_bits: u64) -> Vec<u8> {
    let mut dat = vec![0u8; 10];
    dat[0..2].copy_from_slice(&counter.to_be_bytes());
    dat[2..10].copy_from_slice(&length_bits.to_be_bytes());
    dat
}

/// An xRIT S_PDU: primary header, optional key header, annotation header,
/// then `data`. If `key_index` is nonzero the caller is responsible for the
/// data already being ciphertext.
pub fn build_spdu(file_type: u8, annotation: &str, key_index: u32, data: &[u8]) -> Vec<u8> {
    let mut headers = Vec::new();

    headers.push(7u8); // key header type
    headers.extend_from_slice(&6u16.to_be_bytes());
    headers.extend_from_slice(&key_index.to_be_bytes());

    headers.push(4u8); // annotation text header type
    let ann_len = 3 + annotation.len();
    headers.extend_from_slice(&(ann_len as u16).to_be_bytes());
    headers.extend_from_slice(annotation.as_bytes());

    let total_header_len = (16 + headers.len()) as u32;

    let mut dat = vec![0u8; 16];
    dat[0..3].copy_from_slice(&[0x00, 0x00, 0x10]);
    dat[3] = file_type;
    dat[4..8].copy_from_slice(&total_header_len.to_be_bytes());
    dat[8..16].copy_from_slice(&(data.len() as u64).to_be_bytes());
    dat.extend_from_slice(&headers);
    dat.extend_from_slice(data);
    dat
}

/// Split `bytes` into `ZONE_LEN`-sized chunks (the last one zero-padded),
/// returning `(pointer, chunk)` pairs suitable for feeding to [`build_vcdu`]
/// with consecutive counters. Assumes `bytes` is the entirety of a single
/// CP_PDU that starts at the beginning of the first chunk.
pub fn chunk_into_zones(bytes: &[u8]) -> Vec<Vec<u8>> {
    bytes
        .chunks(ZONE_LEN)
        .map(|c| {
            let mut v = c.to_vec();
            v.resize(ZONE_LEN, 0);
            v
        })
        .collect()
}
