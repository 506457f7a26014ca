//! bmslink-replay: feed a captured notification log through the frame
//! assemblers and print what comes out.
//!
//! ```text
//!  bmslink-replay [--config link.json] [capture | -]
//!
//!  capture (file | stdin)
//!    │   one notification per line, hex, optional "battery:" / "motor:" prefix
//!    ▼
//!  ┌────────────────────┐   ┌──────────────────┐
//!  │ assembler[battery] │   │ assembler[motor] │
//!  └─────────┬──────────┘   └────────┬─────────┘
//!            ▼                       ▼
//!     BmsFrame::parse         raw frame dump
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.  `--config` takes a
//! JSON [`LinkConfig`] so captures from peripherals with a different frame
//! layout can be replayed.  Set `RUST_LOG=debug` to see the assembler's own
//! trace.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;

use bmslink::config::{LinkConfig, Role};
use bmslink::protocol::FrameAssembler;
use bmslink::protocol::bms::BmsFrame;
use bmslink::protocol::frame::Frame;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(std::env::args().skip(1))?;
    let input: Box<dyn Read> = match &args.capture {
        Some(path) if path != "-" => Box::new(
            std::fs::File::open(path).with_context(|| format!("opening capture {path}"))?,
        ),
        _ => Box::new(std::io::stdin()),
    };

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => LinkConfig::default(),
    };
    let mut assemblers = Role::ALL.map(|role| FrameAssembler::new(role, config.frame_format(role)));

    for (lineno, line) in BufReader::new(input).lines().enumerate() {
        let line = line.context("reading capture")?;
        let Some((role, bytes)) =
            parse_line(&line).with_context(|| format!("line {}", lineno + 1))?
        else {
            continue;
        };
        assemblers[role.index()].on_bytes(&bytes, |frame| print_frame(&frame));
    }

    for a in &assemblers {
        let s = a.stats();
        info!(
            "{}: {} frames, {} overflows, {} noise bytes, {} restarts",
            a.role(),
            s.frames,
            s.overflows,
            s.noise_bytes,
            s.restarts
        );
        if a.state().in_frame {
            info!("{}: capture ends inside a frame ({} bytes buffered)", a.role(), a.state().position);
        }
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    capture: Option<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut out = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                out.config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ if out.capture.is_some() => bail!("more than one capture given"),
            _ => out.capture = Some(arg),
        }
    }
    Ok(out)
}

fn load_config(path: &Path) -> Result<LinkConfig> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening config {}", path.display()))?;
    let config: LinkConfig = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    info!("loaded link config from {}", path.display());
    Ok(config)
}

/// `None` for blank and comment lines.
fn parse_line(line: &str) -> Result<Option<(Role, Vec<u8>)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (role, hex) = match line.split_once(':') {
        Some((tag, rest)) if tag.trim().eq_ignore_ascii_case("battery") => {
            (Role::BatteryMonitor, rest)
        }
        Some((tag, rest)) if tag.trim().eq_ignore_ascii_case("motor") => {
            (Role::MotorController, rest)
        }
        Some((tag, _)) => bail!("unknown role prefix {tag:?}"),
        None => (Role::BatteryMonitor, line),
    };
    Ok(Some((role, decode_hex(hex)?)))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).context("non-ASCII input")?;
            u8::from_str_radix(text, 16).with_context(|| format!("bad hex byte {text:?}"))
        })
        .collect()
}

fn print_frame(frame: &Frame) {
    let hex: Vec<String> = frame.payload().iter().map(|b| format!("{b:02x}")).collect();
    println!("{} frame ({} bytes): {}", frame.source(), frame.len(), hex.join(" "));

    if frame.source() == Role::BatteryMonitor {
        match BmsFrame::parse(frame) {
            Ok(f) => println!("  {:?}, {} data bytes", f.register, f.data.len()),
            Err(e) => println!("  invalid: {e}"),
        }
    }
}
