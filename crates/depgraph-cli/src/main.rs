// depgraph: The dependency graph resolution engine.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

use std::io::{IsTerminal, Write};

use clap::Parser;
use colored::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod cli;
mod input;

/// Sends both `tracing` events and `log` records of the engine to stderr.
///
/// `RUST_LOG` filters the output, which defaults to warnings only. With
/// `RUST_LOG` set, targets and line numbers are shown as well.
fn init_tracing() {
    // env RUST_LOG=depgraph::graph=debug depgraph -r repository.json request.json
    let log_env_set = std::env::var("RUST_LOG").is_ok();
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy();

    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(std::io::stderr().is_terminal())
        .with_line_number(log_env_set)
        .with_level(true)
        .with_writer(std::io::stderr);
    let fmt = if !log_env_set {
        fmt.with_target(false).without_time().boxed()
    } else {
        fmt.compact().boxed()
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(fmt.with_filter(filter))
        .try_init()
    {
        eprintln!("Warning: failed to set up logging: {}", e);
    }
}

fn run(cli: cli::DepgraphCli) -> anyhow::Result<i32> {
    let output = cli::resolve(&cli)?;
    std::io::stdout().write_all(output.rendered.as_bytes())?;
    if output.failures.is_empty() {
        return Ok(0);
    }
    for failure in &output.failures {
        eprintln!("{}: {}", "failed".red().bold(), failure);
    }
    Ok(1)
}

pub fn main() {
    let cli = cli::DepgraphCli::parse();
    init_tracing();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:?}", "error".red().bold(), e);
            std::process::exit(-1);
        }
    }
}
