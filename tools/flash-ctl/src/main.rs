// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: flash-ctl entrypoint; prints command output, exits 1 on failure

use std::process::ExitCode;

use flash_ctl::CtlError;

fn main() -> ExitCode {
    env_logger::init();
    match flash_ctl::execute(std::env::args_os()) {
        Ok(out) => {
            print!("{out}");
            if !out.ends_with('\n') {
                println!();
            }
            ExitCode::SUCCESS
        }
        // clap renders help/version and usage errors itself, with its own exit codes.
        Err(CtlError::Usage(err)) => err.exit(),
        Err(err) => {
            eprintln!("flash-ctl: {err}");
            ExitCode::FAILURE
        }
    }
}
