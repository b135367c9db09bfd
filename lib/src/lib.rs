//! Reassembles a CCSDS VCDU downlink stream from a COMS-1-class geostationary
//! weather satellite into complete xRIT files.
//!
//! The pipeline is layered VCDU -> M_PDU -> CP_PDU -> TP_File -> S_PDU -> xRIT,
//! implemented respectively by [`vcdu`], [`mpdu`], [`cppdu`]/[`channel`],
//! [`tpfile`], and [`spdu`]. [`demux`] ties the layers together into a single
//! per-frame entry point; [`input`] supplies frame sources and the queue
//! decoupling a reader thread from the demuxer; [`sink`] writes completed
//! files to disk.

mod error;

pub mod channel;
pub mod cppdu;
pub mod crc;
pub mod demux;
pub mod input;
pub mod keystore;
pub mod mpdu;
pub mod sink;
pub mod spdu;
pub mod tpfile;
pub mod vcdu;

pub use error::{Error, Result};
