//! Demuxer core: the single-threaded consumer that turns a stream of raw
//! VCDU frames into written xRIT files.

use std::collections::HashMap;

use tracing::{debug, info, trace, warn};

use crate::channel::{Channel, ChannelStats};
use crate::crc::CrcTable;
use crate::keystore::KeyStore;
use crate::mpdu::Mpdu;
use crate::sink::OutputSink;
use crate::spdu;
use crate::vcdu::{Vcdu, Vcid, COMS1_SCID, FILL_VCID};

/// Startup gate: avoids beginning reassembly mid-TP_File by discarding all
/// data for the first virtual channel observed until a different VCID shows
/// up. Once released, never re-entered.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Gate {
    WaitingForFirst,
    WaitingForChange(Vcid),
    Released,
}

pub struct Demuxer {
    crc: CrcTable,
    keys: KeyStore,
    sink: OutputSink,
    channels: HashMap<Vcid, Channel>,
    gate: Gate,
    /// Log a one-line statistics summary every this many completed TP_Files,
    /// across all channels combined. 1 logs after every TP_File.
    stats_interval: u64,
    tpfiles_since_report: u64,
}

impl Demuxer {
    #[must_use]
    pub fn new(keys: KeyStore, sink: OutputSink) -> Self {
        Demuxer {
            crc: CrcTable::new(),
            keys,
            sink,
            channels: HashMap::new(),
            gate: Gate::WaitingForFirst,
            stats_interval: 1,
            tpfiles_since_report: 0,
        }
    }

    /// Set the periodic statistics-reporting cadence: a one-line `info`
    /// summary is logged every `n` completed TP_Files (across all channels).
    /// `n == 0` disables periodic reporting; shutdown reporting is unaffected.
    pub fn set_stats_interval(&mut self, n: u64) {
        self.stats_interval = n;
    }

    /// Log a one-line `info` summary of every channel's statistics.
    pub fn report_stats(&self) {
        for (vcid, stats) in self.all_stats() {
            info!(
                vcid,
                frames_seen = stats.frames_seen,
                frames_lost = stats.frames_lost,
                cppdus_ok = stats.cppdus_ok,
                cppdus_crc_failed = stats.cppdus_crc_failed,
                cppdus_length_failed = stats.cppdus_length_failed,
                tpfiles_emitted = stats.tpfiles_emitted,
                tpfiles_length_failed = stats.tpfiles_length_failed,
                "channel statistics"
            );
        }
    }

    /// Process one raw 892-byte frame. Never fails: malformed input and
    /// per-frame processing errors are logged and the stream continues.
    pub fn process_frame(&mut self, raw: Vec<u8>) {
        let Some(frame) = Vcdu::decode(raw) else {
            warn!("frame too short to contain a vcdu header, dropping");
            return;
        };

        if frame.header.scid != COMS1_SCID {
            warn!(scid = frame.header.scid, "unsupported spacecraft id, dropping frame");
            return;
        }

        let vcid = frame.header.vcid;
        let channel = self
            .channels
            .entry(vcid)
            .or_insert_with(|| Channel::new(vcid));
        channel.observe_frame_counter(frame.header.counter);

        if vcid == FILL_VCID {
            trace!("fill vcid, dropping");
            return;
        }

        match &self.gate {
            Gate::WaitingForFirst => {
                debug!(vcid, "startup gate: recorded first vcid seen");
                self.gate = Gate::WaitingForChange(vcid);
                return;
            }
            Gate::WaitingForChange(first) => {
                if vcid == *first {
                    return;
                }
                debug!("startup gate released");
                self.gate = Gate::Released;
            }
            Gate::Released => {}
        }

        let Ok(mpdu) = Mpdu::decode(frame.mpdu_bytes()) else {
            warn!("malformed mpdu payload, dropping frame");
            return;
        };

        let channel = self
            .channels
            .get_mut(&vcid)
            .expect("channel was inserted above");
        if let Some(tpfile_bytes) = channel.process_mpdu(&mpdu, &self.crc) {
            self.handle_tpfile(vcid, tpfile_bytes);
            self.tpfiles_since_report += 1;
            if self.stats_interval > 0 && self.tpfiles_since_report >= self.stats_interval {
                self.report_stats();
                self.tpfiles_since_report = 0;
            }
        }
    }

    /// Run the S_PDU decrypt stage and write the resulting xRIT file.
    fn handle_tpfile(&mut self, vcid: Vcid, s_pdu: Vec<u8>) {
        let parsed = match spdu::parse_headers(&s_pdu) {
            Ok(p) => p,
            Err(e) => {
                warn!(vcid, error = %e, "failed to parse xrit headers, discarding tp_file");
                return;
            }
        };

        let Some(filename) = parsed.filename.clone() else {
            warn!(vcid, "no annotation filename found, discarding tp_file");
            return;
        };

        let plaintext = match spdu::decrypt(&s_pdu, &parsed, &self.keys) {
            Ok(p) => p,
            Err(e) => {
                warn!(vcid, error = %e, filename, "failed to decrypt s_pdu, discarding");
                return;
            }
        };

        match self.sink.write(&filename, parsed.primary.file_type, &plaintext) {
            Ok(path) => debug!(vcid, path = %path.display(), "xrit file written"),
            Err(e) => warn!(vcid, error = %e, filename, "failed to write output file"),
        }
    }

    /// Statistics for a given virtual channel, if it has been seen yet.
    #[must_use]
    pub fn channel_stats(&self, vcid: Vcid) -> Option<&ChannelStats> {
        self.channels.get(&vcid).map(|c| &c.stats)
    }

    /// Statistics for every virtual channel seen so far, in no particular order.
    pub fn all_stats(&self) -> impl Iterator<Item = (Vcid, &ChannelStats)> {
        self.channels.iter().map(|(vcid, c)| (*vcid, &c.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_gate_blocks_until_vcid_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut demux = Demuxer::new(
            KeyStore::default(),
            OutputSink::new(dir.path(), crate::sink::Mode::Lrit),
        );

        // First vcid recorded but not processed.
        let frame = build_fill_free_vcdu(3, 0);
        demux.process_frame(frame);
        assert!(matches!(demux.gate, Gate::WaitingForChange(3)));

        // Same vcid again: still gated.
        let frame = build_fill_free_vcdu(3, 1);
        demux.process_frame(frame);
        assert!(matches!(demux.gate, Gate::WaitingForChange(3)));

        // Different vcid: gate releases.
        let frame = build_fill_free_vcdu(4, 0);
        demux.process_frame(frame);
        assert_eq!(demux.gate, Gate::Released);
    }

    #[test]
    fn fill_vcid_is_dropped_before_gate() {
        let dir = tempfile::tempdir().unwrap();
        let mut demux = Demuxer::new(
            KeyStore::default(),
            OutputSink::new(dir.path(), crate::sink::Mode::Lrit),
        );
        let frame = build_fill_free_vcdu(FILL_VCID, 0);
        demux.process_frame(frame);
        assert_eq!(demux.gate, Gate::WaitingForFirst);
        assert_eq!(demux.channel_stats(FILL_VCID).unwrap().frames_seen, 1);
    }

    fn build_fill_free_vcdu(vcid: u8, counter: u32) -> Vec<u8> {
        let mut dat = vec![0u8; Vcdu::LEN];
        let x: u16 = (u16::from(COMS1_SCID) << 6) | u16::from(vcid & 0x3f);
        dat[0..2].copy_from_slice(&x.to_be_bytes());
        let counter_bytes = counter.to_be_bytes();
        dat[2..5].copy_from_slice(&counter_bytes[1..4]);
        // mpdu header: no-header pointer so frames are inert for this test
        dat[6] = 0x07;
        dat[7] = 0xff;
        dat
    }
}
