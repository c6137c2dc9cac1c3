//! Parses a Sable IR file and prints its canonical form.

use anyhow::Context;
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .context("usage: sable-dump <file>")?;
    let source = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read '{path}'"))?;

    match sable_ir::parse::parse(&source) {
        Ok(module) => {
            print!("{}", sable_ir::stringify::stringify_module(&module));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{path}: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
