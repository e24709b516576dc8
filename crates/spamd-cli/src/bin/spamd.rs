/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `spamd`: the long-lived prefork classification daemon (§4.6/§4.7).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use spamd_cli::daemon_entry::{self, DaemonOptions};
use spamd_cli::{config_loader, runtime::Runtime};

/// spamd — content-based mail classifier daemon
#[derive(Parser, Debug)]
#[command(name = "spamd", version)]
struct Args {
    /// Directory of `*.cf` rule files to load.
    #[arg(long, default_value = "/etc/mail/spamassassin")]
    rules_dir: PathBuf,

    /// Address to listen on, e.g. `127.0.0.1:783`.
    #[arg(long, default_value = "127.0.0.1:783")]
    listen: String,

    #[arg(long, default_value_t = 2)]
    min_children: usize,

    #[arg(long, default_value_t = 16)]
    max_children: usize,

    #[arg(long, default_value_t = 1)]
    min_spare: usize,

    #[arg(long, default_value_t = 4)]
    max_spare: usize,

    /// Enables verbose per-rule tracing regardless of `RUST_LOG`.
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    spamd_cli::logging::init();
    let args = Args::parse();

    let config = match config_loader::load_site_config(&args.rules_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("spamd: failed to load {}: {e}", args.rules_dir.display());
            return ExitCode::FAILURE;
        }
    };
    if config.error_count() > 0 {
        tracing::warn!(errors = config.error_count(), "configuration loaded with warnings");
    }

    let runtime = match Runtime::new(config, args.debug) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("spamd: failed to open bayes store: {e}");
            return ExitCode::FAILURE;
        }
    };

    let opts = DaemonOptions {
        listen_addr: args.listen,
        min_children: args.min_children,
        max_children: args.max_children,
        min_spare: args.min_spare,
        max_spare: args.max_spare,
    };

    match daemon_entry::run(opts, runtime) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("spamd: {e}");
            ExitCode::FAILURE
        }
    }
}
