/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `spamc`: the one-shot client/filter binary (§6 CLI surface). Talks to
//! a running `spamd` for `check`/`symbols`/`report`/`process` (the
//! `spamc`-equivalent wire-protocol verbs), or classifies locally for
//! `filter`/`learn`/`forget`/`lint` (the classic `spamassassin -t` and
//! `sa-learn` invocations).

use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use daemon::protocol::{self, Verb};
use spamd_cli::{classify, config_loader, learn, lint, runtime::Runtime};

#[derive(Parser, Debug)]
#[command(name = "spamc", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a message read from stdin via a running spamd; print the verdict.
    Check(ClientArgs),
    /// Classify via spamd; print the comma-separated matched rule names.
    Symbols(ClientArgs),
    /// Classify via spamd; print the full human-readable report.
    Report(ClientArgs),
    /// Like `report`, but prints nothing for a non-spam verdict.
    ReportIfspam(ClientArgs),
    /// Classify via spamd; print the rewritten message.
    Process(ClientArgs),
    /// Classify a message read from stdin locally, with no daemon, and
    /// print the rewritten message (the `spamassassin -t` invocation).
    Filter(LocalArgs),
    /// Learn a message read from stdin as spam or ham.
    Learn(LearnArgs),
    /// Reverse a previous `learn` for a message read from stdin.
    Forget(LearnArgs),
    /// Parse and validate a rule directory, printing accumulated warnings.
    Lint {
        #[arg(long, default_value = "/etc/mail/spamassassin")]
        rules_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 783)]
    port: u16,
    #[arg(long)]
    user: Option<String>,
}

#[derive(Args, Debug)]
struct LocalArgs {
    #[arg(long, default_value = "/etc/mail/spamassassin")]
    rules_dir: PathBuf,
}

#[derive(Args, Debug)]
struct LearnArgs {
    #[arg(long, default_value = "/etc/mail/spamassassin")]
    rules_dir: PathBuf,
    #[arg(long, conflicts_with = "ham")]
    spam: bool,
    #[arg(long, conflicts_with = "spam")]
    ham: bool,
}

fn read_stdin() -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
}

fn run_client(args: &ClientArgs, verb: Verb) -> spamd_cli::Result<()> {
    let body = read_stdin()?;
    let stream = TcpStream::connect((args.host.as_str(), args.port))?;
    let mut writer = stream.try_clone()?;
    protocol::write_request(&mut writer, verb, "1.5", args.user.as_deref(), &body)?;

    let mut reader = BufReader::new(stream);
    let resp = protocol::read_response(&mut reader).map_err(spamd_cli::CliError::Daemon)?;

    println!(
        "Spam: {} ; {:.1} / {:.1}",
        if resp.is_spam { "true" } else { "false" },
        resp.score,
        resp.threshold
    );
    if !resp.symbols.is_empty() {
        println!("{}", resp.symbols.join(","));
    }
    if let Some(body) = resp.body {
        io::stdout().write_all(&body)?;
    }
    Ok(())
}

fn run_local(rules_dir: &PathBuf) -> spamd_cli::Result<()> {
    let body = read_stdin()?;
    let config = config_loader::load_site_config(rules_dir)?;
    let runtime = Runtime::new(config, false)?;
    let msg = message::Message::parse(&body)?;
    let result = classify::classify(&msg, &runtime);
    io::stdout().write_all(&result.rewritten.to_bytes())?;
    Ok(())
}

fn run_learn(args: &LearnArgs, is_forget: bool) -> spamd_cli::Result<()> {
    let is_spam = args.spam || !args.ham;
    let body = read_stdin()?;
    let config = config_loader::load_site_config(&args.rules_dir)?;
    let runtime = Runtime::new(config, false)?;
    let changed = if is_forget { learn::forget(&runtime, &body, is_spam)? } else { learn::learn(&runtime, &body, is_spam)? };
    if changed {
        eprintln!("{}", if is_forget { "message forgotten" } else { "message learned" });
    } else {
        eprintln!("message already in that state, no change made");
    }
    Ok(())
}

fn run_lint(rules_dir: &PathBuf) -> ExitCode {
    match lint::lint(rules_dir) {
        Ok((_, 0)) => {
            eprintln!("lint: no errors");
            ExitCode::SUCCESS
        }
        Ok((_, n)) => {
            eprintln!("lint: {n} error(s)");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("lint: {e}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    spamd_cli::logging::init();
    let args = Cli::parse();

    let result = match &args.command {
        Command::Check(a) => run_client(a, Verb::Check),
        Command::Symbols(a) => run_client(a, Verb::Symbols),
        Command::Report(a) => run_client(a, Verb::Report),
        Command::ReportIfspam(a) => run_client(a, Verb::ReportIfSpam),
        Command::Process(a) => run_client(a, Verb::Process),
        Command::Filter(a) => run_local(&a.rules_dir),
        Command::Learn(a) => run_learn(a, false),
        Command::Forget(a) => run_learn(a, true),
        Command::Lint { rules_dir } => return run_lint(rules_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("spamc: {e}");
            ExitCode::FAILURE
        }
    }
}
