//! Per-virtual-channel reassembly state machine: M_PDU fragments in, complete
//! CP_PDUs out, routed into a growing TP_File until an EOF marker or a valid
//! `LAST`/`SINGLE` closes it.

use tracing::{debug, trace, warn};

use crate::cppdu::{CpPduHeader, SeqFlag};
use crate::crc::CrcTable;
use crate::mpdu::Mpdu;
use crate::tpfile::TpFileHeader;
use crate::vcdu::Vcid;

/// Per-VCID counters for the continuity/statistics reporter (ambient stack,
/// not part of the reassembly algorithm itself).
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    pub frames_seen: u64,
    pub frames_lost: u64,
    pub cppdus_ok: u64,
    pub cppdus_crc_failed: u64,
    pub cppdus_length_failed: u64,
    pub tpfiles_emitted: u64,
    pub tpfiles_length_failed: u64,
}

#[derive(Debug)]
struct InProgressCpPdu {
    header: CpPduHeader,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
enum CpPduSlot {
    #[default]
    Empty,
    Accumulating(InProgressCpPdu),
}

#[derive(Debug)]
struct InProgressTpFile {
    header: TpFileHeader,
    payload: Vec<u8>,
    last_cppdu_counter: u16,
}

#[derive(Debug, Default)]
enum TpFileSlot {
    #[default]
    Idle,
    Building(InProgressTpFile),
}

/// Reassembly state for one virtual channel.
pub struct Channel {
    pub vcid: Vcid,
    pub stats: ChannelStats,
    last_frame_counter: Option<u32>,
    cppdu: CpPduSlot,
    tpfile: TpFileSlot,
}

impl Channel {
    #[must_use]
    pub fn new(vcid: Vcid) -> Self {
        Channel {
            vcid,
            stats: ChannelStats::default(),
            last_frame_counter: None,
            cppdu: CpPduSlot::Empty,
            tpfile: TpFileSlot::Idle,
        }
    }

    /// Record an observed VCDU counter and return the number of frames lost
    /// since the last one seen on this channel, per [`crate::vcdu::missing_frames`].
    pub fn observe_frame_counter(&mut self, counter: u32) -> u32 {
        self.stats.frames_seen += 1;
        let lost = match self.last_frame_counter {
            Some(last) => crate::vcdu::missing_frames(counter, last),
            None => 0,
        };
        if lost > 0 {
            self.stats.frames_lost += u64::from(lost);
            warn!(vcid = self.vcid, lost, "vcdu frame loss detected");
        }
        self.last_frame_counter = Some(counter);
        lost
    }

    /// Process one M_PDU's worth of data for this channel. Returns the bytes
    /// of a completed, S_PDU-ready TP_File payload if this M_PDU closed one.
    pub fn process_mpdu(&mut self, mpdu: &Mpdu, crc: &CrcTable) -> Option<Vec<u8>> {
        let zone = mpdu.zone;

        if !mpdu.has_header() {
            // No CP_PDU header starts in this M_PDU: append the whole zone to
            // whatever CP_PDU is in progress. If none, we're mid-gap; drop.
            match &mut self.cppdu {
                CpPduSlot::Accumulating(cur) => {
                    cur.payload.extend_from_slice(zone);
                }
                CpPduSlot::Empty => {
                    trace!(vcid = self.vcid, "no current cp_pdu, dropping fill data");
                }
            }
            return None;
        }

        let pointer = mpdu.pointer as usize;

        // `pointer == 0` is the degenerate case of the general boundary below:
        // zero tail bytes close whatever was accumulating (if the previous
        // CP_PDU ended exactly at the previous zone's end) before a new one
        // starts at the very beginning of this zone.
        if pointer >= zone.len() || zone.len() - pointer < CpPduHeader::LEN {
            warn!(vcid = self.vcid, pointer, "cp_pdu header pointer out of range, dropping");
            self.cppdu = CpPduSlot::Empty;
            return None;
        }
        let header_bytes = &zone[pointer..pointer + CpPduHeader::LEN];
        let Ok(next_header) = CpPduHeader::decode(header_bytes) else {
            warn!(vcid = self.vcid, "short cp_pdu header at mpdu boundary, dropping");
            self.cppdu = CpPduSlot::Empty;
            return None;
        };

        let slot = std::mem::take(&mut self.cppdu);
        let mut result = None;
        if let CpPduSlot::Accumulating(mut cur) = slot {
            cur.payload.extend_from_slice(&zone[0..pointer]);
            let completed_header = cur.header;
            let (crc_ok, len_ok) = Self::validate_cppdu(crc, &cur.payload, completed_header);
            if !crc_ok {
                self.stats.cppdus_crc_failed += 1;
            }
            if !len_ok {
                self.stats.cppdus_length_failed += 1;
            }
            if crc_ok && len_ok {
                self.stats.cppdus_ok += 1;
                result = self.feed_cppdu(completed_header, cur.payload);
            }
        } else {
            trace!(vcid = self.vcid, "no current cp_pdu at mpdu boundary, dropping tail");
        }

        if next_header.is_eof_marker() {
            debug!(vcid = self.vcid, "eof marker cp_pdu observed");
            if let Some(finished) = self.close_tpfile_on_eof() {
                result = Some(finished);
            }
            self.cppdu = CpPduSlot::Empty;
        } else {
            let tail_start = pointer + CpPduHeader::LEN;
            self.cppdu = CpPduSlot::Accumulating(InProgressCpPdu {
                header: next_header,
                payload: zone[tail_start..].to_vec(),
            });
        }

        result
    }

    /// Validate a closed CP_PDU's CRC and declared length against the
    /// header. Logs both results; returns `(crc_ok, len_ok)` separately so
    /// the caller can count each failure kind on its own counter — a CP_PDU
    /// can fail both at once.
    fn validate_cppdu(crc: &CrcTable, payload: &[u8], header: CpPduHeader) -> (bool, bool) {
        if payload.len() < 2 {
            warn!("cp_pdu payload too short to contain a crc trailer");
            return (false, false);
        }
        let crc_ok = crc.check(payload);
        if !crc_ok {
            warn!(apid = header.apid, "cp_pdu crc mismatch");
        }
        let actual_len = payload.len() - 2;
        let declared = header.declared_len();
        let len_ok = actual_len == declared;
        if !len_ok {
            warn!(
                apid = header.apid,
                declared, actual_len, "cp_pdu length mismatch"
            );
        }
        (crc_ok, len_ok)
    }

    /// Route a validated CP_PDU's payload (CRC trailer excluded) into the
    /// TP_File builder per its sequence flag.
    fn feed_cppdu(&mut self, header: CpPduHeader, payload: Vec<u8>) -> Option<Vec<u8>> {
        let data = &payload[..payload.len() - 2];

        match header.seq_flag {
            SeqFlag::First => {
                let Ok(tp_header) = TpFileHeader::decode(data) else {
                    warn!(vcid = self.vcid, "failed to decode tp_file header on FIRST cp_pdu");
                    self.tpfile = TpFileSlot::Idle;
                    return None;
                };
                self.tpfile = TpFileSlot::Building(InProgressTpFile {
                    header: tp_header,
                    payload: data[TpFileHeader::LEN..].to_vec(),
                    last_cppdu_counter: header.seq_counter,
                });
                None
            }
            SeqFlag::Continue => {
                self.check_cppdu_continuity(header.seq_counter);
                if let TpFileSlot::Building(cur) = &mut self.tpfile {
                    cur.payload.extend_from_slice(data);
                    cur.last_cppdu_counter = header.seq_counter;
                } else {
                    trace!(vcid = self.vcid, "CONTINUE cp_pdu with no tp_file in progress, dropping");
                }
                None
            }
            SeqFlag::Last => {
                self.check_cppdu_continuity(header.seq_counter);
                if let TpFileSlot::Building(cur) = &mut self.tpfile {
                    cur.payload.extend_from_slice(data);
                }
                self.finish_tpfile()
            }
            SeqFlag::Single => {
                let Ok(tp_header) = TpFileHeader::decode(data) else {
                    warn!(vcid = self.vcid, "failed to decode tp_file header on SINGLE cp_pdu");
                    self.tpfile = TpFileSlot::Idle;
                    return None;
                };
                self.tpfile = TpFileSlot::Building(InProgressTpFile {
                    header: tp_header,
                    payload: data[TpFileHeader::LEN..].to_vec(),
                    last_cppdu_counter: header.seq_counter,
                });
                self.finish_tpfile()
            }
        }
    }

    fn check_cppdu_continuity(&mut self, counter: u16) {
        if let TpFileSlot::Building(cur) = &self.tpfile {
            let expected = cur.last_cppdu_counter.wrapping_add(1) & 0x3fff;
            if counter != expected {
                warn!(
                    vcid = self.vcid,
                    expected, got = counter, "cp_pdu sequence counter gap"
                );
            }
        }
    }

    /// Validate the accumulated TP_File against its declared length and, if
    /// it matches, hand its payload to the caller for S_PDU processing.
    fn finish_tpfile(&mut self) -> Option<Vec<u8>> {
        let slot = std::mem::take(&mut self.tpfile);
        let TpFileSlot::Building(cur) = slot else {
            return None;
        };
        let declared = cur.header.length_bytes();
        let actual = cur.payload.len() as u64;
        if declared == actual {
            self.stats.tpfiles_emitted += 1;
            debug!(vcid = self.vcid, counter = cur.header.counter, bytes = actual, "tp_file complete");
            Some(cur.payload)
        } else {
            self.stats.tpfiles_length_failed += 1;
            warn!(
                vcid = self.vcid,
                declared, actual, "tp_file length mismatch, discarding"
            );
            None
        }
    }

    /// Close the in-progress TP_File on receipt of the EOF-marker CP_PDU.
    /// Unlike [`Self::finish_tpfile`] this does not re-validate length against
    /// the TP_File header: the EOF marker is itself the completion signal.
    fn close_tpfile_on_eof(&mut self) -> Option<Vec<u8>> {
        let slot = std::mem::take(&mut self.tpfile);
        match slot {
            TpFileSlot::Building(cur) => {
                self.stats.tpfiles_emitted += 1;
                debug!(vcid = self.vcid, counter = cur.header.counter, "tp_file complete (eof marker)");
                Some(cur.payload)
            }
            TpFileSlot::Idle => None,
        }
    }
}
