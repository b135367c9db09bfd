//! S_PDU stage: parses the xRIT primary and secondary headers carried by a
//! completed TP_File, resolves the decryption key (if any), and decrypts the
//! xRIT data field.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, KeyInit};
use tracing::debug;

use crate::error::{Error, Result};
use crate::keystore::KeyStore;

type DesEcbDec = ecb::Decryptor<des::Des>;

/// xRIT primary header type code, per the Annotation/Key header walk.
pub const HEADER_TYPE_IMAGE_STRUCTURE: u8 = 1;
pub const HEADER_TYPE_IMAGE_NAVIGATION: u8 = 2;
pub const HEADER_TYPE_IMAGE_DATA_FUNCTION: u8 = 3;
pub const HEADER_TYPE_ANNOTATION_TEXT: u8 = 4;
pub const HEADER_TYPE_TIME_STAMP: u8 = 5;
pub const HEADER_TYPE_KEY: u8 = 7;
pub const HEADER_TYPE_IMAGE_SEGMENTATION: u8 = 128;

/// xRIT file type, from the primary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    ImageData,
    GtsMessage,
    AlphanumericText,
    EncryptionKeyMessage,
    Cmdps,
    Nwp,
    Goci,
    Typhoon,
    Other(u8),
}

impl FileType {
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => FileType::ImageData,
            1 => FileType::GtsMessage,
            2 => FileType::AlphanumericText,
            3 => FileType::EncryptionKeyMessage,
            128 => FileType::Cmdps,
            129 => FileType::Nwp,
            130 => FileType::Goci,
            131 => FileType::Typhoon,
            other => FileType::Other(other),
        }
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        matches!(self, FileType::ImageData)
    }
}

/// The xRIT primary header: 16 bytes.
#[derive(Debug, Clone, Copy)]
pub struct PrimaryHeader {
    pub file_type: FileType,
    pub total_header_len: u32,
    pub data_field_len: u64,
}

impl PrimaryHeader {
    pub const LEN: usize = 16;
    const MAGIC: [u8; 3] = [0x00, 0x00, 0x10];

    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: dat.len(),
                minimum: Self::LEN,
            });
        }
        if dat[0..3] != Self::MAGIC {
            return Err(Error::InvalidHeader("bad primary header magic".into()));
        }
        Ok(PrimaryHeader {
            file_type: FileType::from_code(dat[3]),
            total_header_len: u32::from_be_bytes(dat[4..8].try_into().expect("4 bytes")),
            data_field_len: u64::from_be_bytes(dat[8..16].try_into().expect("8 bytes")),
        })
    }
}

/// A decoded secondary header: type code, declared length (including the
/// 3-byte type+length prefix), and body bytes.
struct SecondaryHeader<'a> {
    header_type: u8,
    body: &'a [u8],
    next_offset: usize,
}

/// Walk the secondary header chain starting at `offset` (immediately after
/// the 16-byte primary header) until `offset` reaches `end`.
fn walk_headers(data: &[u8], mut offset: usize, end: usize) -> Vec<SecondaryHeader<'_>> {
    let mut headers = Vec::new();
    while offset + 3 <= end && offset + 3 <= data.len() {
        let header_type = data[offset];
        let len = u16::from_be_bytes([data[offset + 1], data[offset + 2]]) as usize;
        if len < 3 || offset + len > data.len() {
            break;
        }
        headers.push(SecondaryHeader {
            header_type,
            body: &data[offset + 3..offset + len],
            next_offset: offset + len,
        });
        offset += len;
    }
    headers
}

/// Result of parsing an S_PDU's xRIT headers, prior to decryption.
pub struct ParsedSpdu {
    pub primary: PrimaryHeader,
    pub key_index: u32,
    pub filename: Option<String>,
    pub time_stamp: Option<NaiveDateTime>,
}

/// Decode a CCSDS Time Stamp header body (CDS P-field + T-field, 7 bytes) into
/// a timestamp against the CCSDS 1958-01-01 epoch: a 16-bit day count followed
/// by a 32-bit millisecond-of-day count, both big-endian.
fn decode_time_stamp(body: &[u8]) -> Option<NaiveDateTime> {
    if body.len() < 7 {
        return None;
    }
    let days = i64::from(u16::from_be_bytes([body[1], body[2]]));
    let millis = i64::from(u32::from_be_bytes([body[3], body[4], body[5], body[6]]));
    let epoch = NaiveDate::from_ymd_opt(1958, 1, 1)?.and_hms_opt(0, 0, 0)?;
    epoch.checked_add_signed(Duration::days(days) + Duration::milliseconds(millis))
}

/// Parse the xRIT primary header and walk the secondary headers for the Key
/// header (decryption key index) and Annotation Text header (output filename).
pub fn parse_headers(data: &[u8]) -> Result<ParsedSpdu> {
    let primary = PrimaryHeader::decode(data)?;
    let headers = walk_headers(data, PrimaryHeader::LEN, primary.total_header_len as usize);

    let mut key_index = 0u32;
    let mut filename = None;
    let mut time_stamp = None;

    for h in &headers {
        match h.header_type {
            HEADER_TYPE_KEY if h.body.len() >= 4 => {
                key_index = u32::from_be_bytes(h.body[0..4].try_into().expect("4 bytes"));
            }
            HEADER_TYPE_ANNOTATION_TEXT => {
                filename = std::str::from_utf8(h.body).ok().map(ToString::to_string);
            }
            HEADER_TYPE_IMAGE_STRUCTURE => debug!("image structure header present"),
            HEADER_TYPE_IMAGE_NAVIGATION => debug!("image navigation header present"),
            HEADER_TYPE_IMAGE_DATA_FUNCTION => debug!("image data function header present"),
            HEADER_TYPE_TIME_STAMP => {
                time_stamp = decode_time_stamp(h.body);
                debug!(?time_stamp, "ccsds time stamp header present");
            }
            HEADER_TYPE_IMAGE_SEGMENTATION => debug!("image segmentation info header present"),
            _ => {}
        }
        let _ = h.next_offset;
    }

    Ok(ParsedSpdu {
        primary,
        key_index,
        filename,
        time_stamp,
    })
}

/// Decrypt an S_PDU given its parsed headers and a key store. Headers pass
/// through unmodified; only the data field is decrypted. Returns the full
/// xRIT file bytes (headers followed by plaintext data).
pub fn decrypt(data: &[u8], parsed: &ParsedSpdu, keys: &KeyStore) -> Result<Vec<u8>> {
    let header_len = parsed.primary.total_header_len as usize;
    if header_len > data.len() {
        return Err(Error::InvalidHeader("total_header_len exceeds s_pdu size".into()));
    }
    let (headers, field) = data.split_at(header_len);
    let data_field = &field[..(parsed.primary.data_field_len as usize).min(field.len())];

    if parsed.key_index == 0 {
        let mut out = Vec::with_capacity(data.len());
        out.extend_from_slice(headers);
        out.extend_from_slice(data_field);
        return Ok(out);
    }

    let key = keys
        .lookup(u64::from(parsed.key_index))
        .ok_or(Error::UnknownKey(u64::from(parsed.key_index)))?;

    let mut padded = data_field.to_vec();
    let pad = (8 - padded.len() % 8) % 8;
    padded.extend(std::iter::repeat(0u8).take(pad));
    let original_len = data_field.len();

    let decryptor = DesEcbDec::new_from_slice(&key)
        .map_err(|e| Error::DecryptFailure(e.to_string()))?;
    let plain_len = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut padded)
        .map_err(|e| Error::DecryptFailure(e.to_string()))?
        .len();
    padded.truncate(plain_len.min(original_len));

    let mut out = Vec::with_capacity(headers.len() + padded.len());
    out.extend_from_slice(headers);
    out.extend_from_slice(&padded);
    Ok(out)
}
