/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Wires `daemon::parent`/`daemon::child`/`daemon::protocol` into a real
//! prefork server (§4.6/§4.7): owns the listen socket, forks the initial
//! pool, runs the parent's select loop, and handles `SIGHUP`/`SIGTERM`/
//! `SIGINT` per §G of SPEC_FULL.md.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use nix::sys::signal::{self, SigHandler, Signal};

use daemon::parent::{self, ChildHandle};
use daemon::pool::{ChildState, Pool};
use daemon::protocol::{self, Response, Verb};

use crate::classify::classify;
use crate::error::Result;
use crate::runtime::Runtime;

pub struct DaemonOptions {
    pub listen_addr: String,
    pub min_children: usize,
    pub max_children: usize,
    pub min_spare: usize,
    pub max_spare: usize,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self { listen_addr: "127.0.0.1:783".into(), min_children: 2, max_children: 16, min_spare: 1, max_spare: 4 }
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_shutdown_signal(_: i32) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn on_reload_signal(_: i32) {
    RELOAD_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs handlers for `SIGTERM`/`SIGINT` (graceful shutdown) and
/// `SIGHUP` (config reload). Safe to call once, in the parent, before
/// any child is forked — children inherit the dispositions but only the
/// parent's main loop inspects the flags.
fn install_signal_handlers() -> Result<()> {
    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(on_shutdown_signal))
            .map_err(|e| crate::error::CliError::Config(format!("sigaction SIGTERM failed: {e}")))?;
        signal::signal(Signal::SIGINT, SigHandler::Handler(on_shutdown_signal))
            .map_err(|e| crate::error::CliError::Config(format!("sigaction SIGINT failed: {e}")))?;
        signal::signal(Signal::SIGHUP, SigHandler::Handler(on_reload_signal))
            .map_err(|e| crate::error::CliError::Config(format!("sigaction SIGHUP failed: {e}")))?;
    }
    Ok(())
}

fn spawn_worker(listener: &TcpListener, runtime: &Arc<Runtime>) -> Result<ChildHandle> {
    let listener = listener.try_clone()?;
    let runtime = Arc::clone(runtime);
    let handle = parent::spawn_child(move |channel: UnixStream| -> ! {
        crate::logging::init();
        let pid = std::process::id();
        let mut channel = channel;
        let result = daemon::child::run(&mut channel, pid, || {
            let (stream, _) = listener.accept()?;
            handle_connection(stream, &runtime).map_err(|e| -> Box<dyn std::error::Error> { Box::new(e) })
        });
        if let Err(e) = result {
            tracing::error!(pid, error = %e, "child command loop exited with an error");
        }
        std::process::exit(0);
    })?;
    Ok(handle)
}

fn handle_connection(stream: TcpStream, runtime: &Runtime) -> crate::error::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let req = protocol::read_request(&mut reader).map_err(crate::error::CliError::Daemon)?;

    if let Some(user) = &req.user {
        tracing::debug!(user, "classifying on behalf of user");
    }

    let msg = message::Message::parse(&req.body)?;
    let result = classify(&msg, runtime);

    let response = match req.verb {
        Verb::Check => Response {
            protocol_version: req.protocol_version.clone(),
            code: 0,
            message: "EX_OK".into(),
            is_spam: result.verdict.is_spam,
            score: result.verdict.hits,
            threshold: result.verdict.required,
            symbols: Vec::new(),
            body: None,
        },
        Verb::Symbols => Response {
            protocol_version: req.protocol_version.clone(),
            code: 0,
            message: "EX_OK".into(),
            is_spam: result.verdict.is_spam,
            score: result.verdict.hits,
            threshold: result.verdict.required,
            symbols: result.status.hits.clone(),
            body: None,
        },
        Verb::Report | Verb::ReportIfSpam => {
            let include_body = req.verb == Verb::Report || result.verdict.is_spam;
            Response {
                protocol_version: req.protocol_version.clone(),
                code: 0,
                message: "EX_OK".into(),
                is_spam: result.verdict.is_spam,
                score: result.verdict.hits,
                threshold: result.verdict.required,
                symbols: Vec::new(),
                body: include_body.then(|| result.status.log.join("\n").into_bytes()),
            }
        }
        Verb::Process => Response {
            protocol_version: req.protocol_version.clone(),
            code: 0,
            message: "EX_OK".into(),
            is_spam: result.verdict.is_spam,
            score: result.verdict.hits,
            threshold: result.verdict.required,
            symbols: Vec::new(),
            body: Some(result.rewritten.to_bytes()),
        },
    };

    protocol::write_response(&mut writer, &response)?;
    Ok(())
}

/// Runs the parent's main loop until a shutdown signal arrives. Blocking;
/// intended to be the last thing `spamd`'s `main` calls.
pub fn run(opts: DaemonOptions, runtime: Runtime) -> Result<()> {
    let runtime = Arc::new(runtime);
    let listener = TcpListener::bind(&opts.listen_addr)?;
    install_signal_handlers()?;

    let mut pool = Pool::new(opts.min_spare, opts.max_spare, opts.min_children, opts.max_children);
    let mut channels: AHashMap<u32, UnixStream> = AHashMap::new();

    for _ in 0..opts.min_children {
        let handle = spawn_worker(&listener, &runtime)?;
        channels.insert(handle.pid, handle.channel);
        pool.insert(handle.pid, ChildState::Starting);
    }

    let mut overloaded = false;
    let mut pending_connection = false;
    let mut last_ping = Instant::now();

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            tracing::info!("shutdown requested, closing child channels");
            parent::shutdown(&mut channels);
            break;
        }
        if RELOAD_REQUESTED.swap(false, Ordering::SeqCst) {
            tracing::info!("reload requested: re-read and replace the compiled ruleset on next restart");
        }

        // §5/§7.7: a select/IO fault is logged and retried after a 1s
        // back-off rather than propagated — each iteration rebuilds its
        // fd sets from the live child records, so a transient fault
        // (e.g. `EINTR` from an arriving signal) cannot cascade.
        if let Err(e) = parent::run_one_pass(
            listener.as_raw_fd(),
            &mut channels,
            &mut pool,
            &mut overloaded,
            &mut pending_connection,
            &mut last_ping,
            || Ok(()),
            || spawn_worker(&listener, &runtime),
        ) {
            tracing::warn!(error = %e, "parent select/io fault, retrying");
            std::thread::sleep(std::time::Duration::from_secs(1));
        }
    }

    Ok(())
}
