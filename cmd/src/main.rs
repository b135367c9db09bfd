mod config;

use std::io::stderr;
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xrit_demux::demux::Demuxer;
use xrit_demux::input::{frame_queue, FileSource, FrameSource, GoesRecvSource, OspSource};
use xrit_demux::keystore::KeyStore;
use xrit_demux::sink::OutputSink;
use xrit_demux::vcdu::{VcduHeader, FILL_VCID};

use config::{Config, Input};

#[derive(Parser)]
#[command(version, about = "COMS-1 xRIT downlink receiver")]
struct Cli {
    /// Path to an INI configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read VCDUs from this file instead of the network source in the config.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to the decrypted DES key table.
    #[arg(short, long)]
    keys: Option<PathBuf>,

    /// Enable per-frame logging.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Write a copy of every non-fill VCDU to this path.
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("XRIT_LOG").unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!(
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );

    let cfg = Config::load(cli.config.as_deref(), cli.file.clone())
        .context("failed to load configuration")?;

    let keys = match &cli.keys {
        Some(path) => KeyStore::load(path).context("failed to load key table")?,
        None => KeyStore::default(),
    };

    let sink = OutputSink::new(cfg.output.clone(), cfg.mode);
    let mut demuxer = Demuxer::new(keys, sink);
    demuxer.set_stats_interval(cfg.stats_interval);

    let (producer, consumer) = frame_queue(64);

    let dump_path = cli.dump.clone();
    let reader = thread::spawn(move || -> Result<()> {
        let mut dump_file = match dump_path {
            Some(p) => Some(std::fs::File::create(p).context("failed to create dump file")?),
            None => None,
        };

        let mut source: Box<dyn FrameSource> = match cfg.input {
            Input::Osp { ip, vchan } => {
                info!(ip, vchan, "connecting to osp source");
                Box::new(OspSource::connect(&format!("{ip}:{vchan}"))?)
            }
            Input::GoesRecv { ip, vchan } => {
                info!(ip, vchan, "connecting to goesrecv source");
                Box::new(GoesRecvSource::connect(&format!("{ip}:{vchan}"))?)
            }
            Input::File(path) => {
                info!(?path, "reading vcdus from file");
                Box::new(FileSource::open(&path)?)
            }
        };

        loop {
            match source.pull()? {
                Some(frame) => {
                    if let Some(f) = dump_file.as_mut() {
                        let is_fill = VcduHeader::decode(&frame)
                            .is_some_and(|h| h.vcid == FILL_VCID);
                        if !is_fill {
                            use std::io::Write;
                            f.write_all(&frame).context("failed to write dump file")?;
                        }
                    }
                    if producer.push(frame).is_err() {
                        warn!("demuxer core gone, stopping reader");
                        break;
                    }
                }
                None => {
                    info!("input source reached clean end of stream");
                    break;
                }
            }
        }
        Ok(())
    });

    while let Some(frame) = consumer.pull() {
        demuxer.process_frame(frame);
    }

    info!("final channel statistics:");
    demuxer.report_stats();

    reader
        .join()
        .expect("reader thread panicked")
        .context("frame reader failed")?;

    Ok(())
}
