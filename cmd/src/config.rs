//! INI configuration loading for the `[rx]`/`[osp]`/`[goesrecv]` sections.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ini::Ini;
use xrit_demux::sink::Mode;

/// Selects which frame source the reader thread will use.
#[derive(Debug, Clone)]
pub enum Input {
    Osp { ip: String, vchan: u16 },
    GoesRecv { ip: String, vchan: u16 },
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub input: Input,
    pub mode: Mode,
    pub output: PathBuf,
    /// Log a channel-statistics summary every this many completed TP_Files.
    pub stats_interval: u64,
}

impl Config {
    /// Load and validate a config from an INI file, then apply the `--file`
    /// override if present.
    pub fn load(path: Option<&Path>, file_override: Option<PathBuf>) -> Result<Self> {
        let ini = match path {
            Some(p) => Ini::load_from_file(p)
                .with_context(|| format!("failed to parse config file {p:?}"))?,
            None => Ini::new(),
        };

        let rx = ini.section(Some("rx"));
        let mode = match rx.and_then(|s| s.get("mode")) {
            Some("HRIT") | Some("hrit") => Mode::Hrit,
            _ => Mode::Lrit,
        };
        let output = rx
            .and_then(|s| s.get("output"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("output"));
        let stats_interval = rx
            .and_then(|s| s.get("stats_interval"))
            .map(|v| v.parse())
            .transpose()
            .with_context(|| "invalid [rx].stats_interval".to_string())?
            .unwrap_or(1);

        let input = if let Some(file_path) = file_override {
            Input::File(file_path)
        } else {
            let input_kind = rx
                .and_then(|s| s.get("input"))
                .ok_or_else(|| anyhow!("config missing [rx].input"))?;
            match input_kind.to_ascii_uppercase().as_str() {
                "OSP" => {
                    let osp = ini
                        .section(Some("osp"))
                        .ok_or_else(|| anyhow!("config missing [osp] section"))?;
                    Input::Osp {
                        ip: required(osp, "ip")?,
                        vchan: required_parse(osp, "vchan")?,
                    }
                }
                "GOESRECV" => {
                    let gr = ini
                        .section(Some("goesrecv"))
                        .ok_or_else(|| anyhow!("config missing [goesrecv] section"))?;
                    Input::GoesRecv {
                        ip: required(gr, "ip")?,
                        vchan: required_parse(gr, "vchan")?,
                    }
                }
                "FILE" => {
                    let path = rx
                        .and_then(|s| s.get("file"))
                        .ok_or_else(|| anyhow!("config [rx].input=FILE requires [rx].file"))?;
                    Input::File(PathBuf::from(path))
                }
                other => return Err(anyhow!("unsupported [rx].input value: {other}")),
            }
        };

        Ok(Config {
            input,
            mode,
            output,
            stats_interval,
        })
    }
}

fn required(section: &ini::Properties, key: &str) -> Result<String> {
    section
        .get(key)
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("config missing required key {key}"))
}

fn required_parse<T: std::str::FromStr>(section: &ini::Properties, key: &str) -> Result<T> {
    let raw = required(section, key)?;
    raw.parse()
        .map_err(|_| anyhow!("config key {key} has invalid value {raw:?}"))
}
