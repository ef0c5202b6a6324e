// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host-side control harness for the FLASH accelerator protocol
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: unit tests below + tests/cli.rs
//! PUBLIC API: execute(args), Cli, CtlError
//! DEPENDS_ON: clap, flash-wire, flash-sched (backend-host)
//!
//! Mirrors the two device controls of the bring-up harness: inject a change
//! message, and trigger a schedule request. `encode`/`decode` work on raw
//! register words; `replay` drives a script against the in-memory accelerator.
//!
//! Replay script lines:
//!
//! ```text
//! # comment
//! write <new|state|pri|0xNN> <pid> <pri> <state-name|number>
//! sched
//! ```

#![forbid(unsafe_code)]

use std::ffi::OsString;
use std::io::Read as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use flash_sched::{AcceleratorClient, MmioBridge, RegisterLayout, SimAccelerator};
use flash_wire::{ChangeKind, ChangeMessage, EntityId, TaskState};
use log::debug;

/// Errors surfaced by the control tool.
#[derive(Debug, thiserror::Error)]
pub enum CtlError {
    /// Command line could not be parsed (also carries `--help`/`--version`).
    #[error(transparent)]
    Usage(#[from] clap::Error),
    /// The replay script could not be read.
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// A replay script line is malformed.
    #[error("line {line}: {msg}")]
    Script { line: usize, msg: String },
    /// The scheduling core reported an error.
    #[error(transparent)]
    Flash(#[from] flash_sched::Error),
}

#[derive(Debug, Parser)]
#[command(name = "flash-ctl", version, about = "Drive the FLASH accelerator protocol from the host")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the two register words of a change message.
    Encode {
        #[arg(long, value_parser = parse_kind)]
        kind: ChangeKind,
        #[arg(long)]
        pid: u16,
        #[arg(long, default_value_t = 0)]
        pri: u8,
        #[arg(long, default_value = "runnable", value_parser = parse_state)]
        state: TaskState,
    },
    /// Unpack two register words into a change message.
    Decode {
        #[arg(value_parser = parse_word)]
        low: u32,
        #[arg(value_parser = parse_word)]
        high: u32,
    },
    /// Replay a script of write/sched requests against the in-memory accelerator.
    Replay {
        /// Script path, or `-` for stdin.
        script: PathBuf,
        #[arg(long, value_enum, default_value_t = Layout::Mature)]
        layout: Layout,
        /// Reply polls before a schedule request times out.
        #[arg(long, default_value_t = 1_000)]
        spins: u32,
        /// Reply bits meaning "not answered yet"; 0 takes the first read.
        #[arg(long, default_value = "0xffff0000", value_parser = parse_word)]
        pending_mask: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Layout {
    Mature,
    Harness,
}

impl From<Layout> for RegisterLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Mature => RegisterLayout::MATURE,
            Layout::Harness => RegisterLayout::HARNESS,
        }
    }
}

fn parse_word(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid word '{s}': {e}"))
}

fn parse_kind(s: &str) -> Result<ChangeKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "new" => Ok(ChangeKind::NEW),
        "state" => Ok(ChangeKind::STATE_CHANGED),
        "pri" => Ok(ChangeKind::PRI_CHANGED),
        _ => {
            let raw = parse_word(s)?;
            u8::try_from(raw)
                .map(ChangeKind::from_bits_retain)
                .map_err(|_| format!("kind '{s}' does not fit in 8 bits"))
        }
    }
}

fn parse_state(s: &str) -> Result<TaskState, String> {
    if let Some(state) = TaskState::from_name(s) {
        return Ok(state);
    }
    let raw = parse_word(s)?;
    u16::try_from(raw)
        .map(TaskState::from_raw)
        .map_err(|_| format!("state '{s}' does not fit in 16 bits"))
}

fn describe(msg: &ChangeMessage) -> String {
    format!("kind={:#04x} id={} pri={} state={:?}", msg.kind.bits(), msg.id, msg.priority, msg.state)
}

fn encode(kind: ChangeKind, pid: u16, pri: u8, state: TaskState) -> String {
    let msg = ChangeMessage::new(kind, EntityId::from_raw(pid), pri, state);
    let [low, high] = msg.to_words();
    format!("low={low:#010x} high={high:#010x}")
}

fn decode(low: u32, high: u32) -> String {
    describe(&ChangeMessage::from_words(low, high))
}

fn read_script(path: &PathBuf) -> Result<String, CtlError> {
    let io_err = |source| CtlError::Io { path: path.display().to_string(), source };
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(io_err)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).map_err(io_err)
    }
}

/// Runs a replay script against a fresh in-memory accelerator.
pub fn replay(script: &str, layout: RegisterLayout, spins: u32) -> Result<String, CtlError> {
    let sim = SimAccelerator::new(layout);
    let client = AcceleratorClient::new(MmioBridge::new(&sim, layout), spins);
    let mut out = String::new();

    for (idx, raw) in script.lines().enumerate() {
        let line = idx + 1;
        let text = raw.split('#').next().unwrap_or_default().trim();
        if text.is_empty() {
            continue;
        }
        let fields: Vec<&str> = text.split_whitespace().collect();
        let bad = |msg: String| CtlError::Script { line, msg };
        match fields.as_slice() {
            ["write", kind, pid, pri, state] => {
                let kind = parse_kind(kind).map_err(bad)?;
                let pid: u16 = pid.parse().map_err(|e| bad(format!("pid: {e}")))?;
                let pri: u8 = pri.parse().map_err(|e| bad(format!("pri: {e}")))?;
                let state = parse_state(state).map_err(bad)?;
                let entity = flash_sched::Entity::new(EntityId::from_raw(pid), pri, state);
                client.notify_change(kind, &entity)?;
                let msg = ChangeMessage::new(kind, entity.id, pri, state);
                out.push_str(&format!("write {}\n", describe(&msg)));
            }
            ["sched"] => match client.query_next() {
                Ok(id) => out.push_str(&format!("next={id}\n")),
                Err(flash_sched::Error::Timeout { spins }) => {
                    out.push_str(&format!("sched timeout after {spins} spins\n"));
                }
                Err(err) => return Err(err.into()),
            },
            _ => return Err(bad(format!("unrecognised request '{text}'"))),
        }
    }

    debug!(target: "flash::ctl", "replay done: {:?}", client.stats());
    Ok(out)
}

/// Parses `args` (including the program name) and runs the selected command.
pub fn execute<I, T>(args: I) -> Result<String, CtlError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    match cli.command {
        Command::Encode { kind, pid, pri, state } => Ok(encode(kind, pid, pri, state)),
        Command::Decode { low, high } => Ok(decode(low, high)),
        Command::Replay { script, layout, spins, pending_mask } => {
            let text = read_script(&script)?;
            replay(&text, RegisterLayout::from(layout).with_pending_mask(pending_mask), spins)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_matches_device_layout() {
        let out = execute(["flash-ctl", "encode", "--kind", "new", "--pid", "7", "--pri", "5"]).unwrap();
        assert_eq!(out, "low=0x05000707 high=0x00000000");
    }

    #[test]
    fn decode_names_known_states() {
        let out = execute(["flash-ctl", "decode", "0x05000702", "0x20"]).unwrap();
        assert_eq!(out, "kind=0x02 id=7 pri=5 state=dead");
    }

    #[test]
    fn kind_and_state_parsers_accept_numbers() {
        assert_eq!(parse_kind("0x4"), Ok(ChangeKind::NEWLY_CREATED));
        assert!(parse_kind("0x100").is_err());
        assert_eq!(parse_state("0x20"), Ok(TaskState::DEAD));
        assert_eq!(parse_state("Parked"), Ok(TaskState::PARKED));
    }

    #[test]
    fn replay_reports_picks_and_timeouts() {
        let script = "write new 1 0 runnable\nwrite new 2 0 runnable\nsched\nsched\n# retire both\nwrite state 1 0 dead\nwrite state 2 0 dead\nsched\n";
        let out = replay(script, RegisterLayout::MATURE, 4).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[2], "next=1");
        assert_eq!(lines[3], "next=2");
        assert_eq!(lines[6], "sched timeout after 4 spins");
    }

    #[test]
    fn replay_rejects_unknown_requests() {
        let err = replay("sched\nfrobnicate\n", RegisterLayout::HARNESS, 1).unwrap_err();
        assert!(matches!(err, CtlError::Script { line: 2, .. }));
    }
}
