/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Parent-side Apache-MPM-prefork main loop (§4.6). Owns the listen
//! socket and one socketpair channel per child; never touches message
//! content itself, only the 6-byte command frames.

use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use nix::sys::select::{select, FdSet};
use nix::sys::signal::{kill, Signal};
use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use nix::sys::time::TimeVal;
use nix::unistd::{fork, ForkResult, Pid};

use crate::child::TOUT_PING_INTERVAL;
use crate::error::{DaemonError, Result};
use crate::frame::Frame;
use crate::pool::{ChildState, Pool, PoolAction};

/// One live child as seen by the parent: its pid and its end of the
/// command socketpair.
pub struct ChildHandle {
    pub pid: u32,
    pub channel: UnixStream,
}

/// Forks a new worker, wiring up its half of a fresh socketpair before
/// handing control to `child_entry` (which never returns: it runs
/// [`crate::child::run`] and then exits the process).
pub fn spawn_child(child_entry: impl FnOnce(UnixStream) -> !) -> Result<ChildHandle> {
    let (parent_fd, child_fd) = socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::empty())
        .map_err(|e| DaemonError::Protocol(format!("socketpair failed: {e}")))?;

    match unsafe { fork() }.map_err(|e| DaemonError::Protocol(format!("fork failed: {e}")))? {
        ForkResult::Parent { child } => {
            drop(child_fd);
            let channel = UnixStream::from(parent_fd);
            Ok(ChildHandle { pid: child.as_raw() as u32, channel })
        }
        ForkResult::Child => {
            drop(parent_fd);
            let channel = UnixStream::from(child_fd);
            child_entry(channel);
        }
    }
}

/// Sends `SIGINT` to a child scheduled for death (protocol fault, or
/// pool shrink), matching §4.6's "kill" step.
pub fn kill_child(pid: u32) -> Result<()> {
    kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(|e| DaemonError::Protocol(format!("kill failed: {e}")))
}

/// Runs one pass of the parent loop: selects across every child channel
/// plus the listen socket (unless overloaded), dispatches the result,
/// and finally applies one pool-size adjustment. Returns `false` when
/// `shutdown` should stop the caller's outer loop.
#[allow(clippy::too_many_arguments)]
pub fn run_one_pass(
    listen_fd: RawFd,
    channels: &mut AHashMap<u32, UnixStream>,
    pool: &mut Pool,
    overloaded: &mut bool,
    pending_connection: &mut bool,
    last_ping: &mut Instant,
    mut accept_and_queue: impl FnMut() -> Result<()>,
    mut spawn_one: impl FnMut() -> Result<ChildHandle>,
) -> Result<()> {
    let mut read_set = FdSet::new();
    for chan in channels.values() {
        read_set.insert(chan.as_raw_fd());
    }
    if !*overloaded {
        read_set.insert(listen_fd);
    }

    let mut timeout = TimeVal::new(1, 0);
    let ready = select(None, &mut read_set, None, None, &mut timeout)
        .map_err(|e| DaemonError::Protocol(format!("select failed: {e}")))?;

    if ready == 0 {
        if last_ping.elapsed() >= TOUT_PING_INTERVAL {
            broadcast_ping(channels, pool)?;
            *last_ping = Instant::now();
        }
    } else {
        if read_set.contains(listen_fd) {
            if let Some(pid) = pool.lowest_pid_idle() {
                dispatch_to_child(pid, channels, pool)?;
                accept_and_queue()?;
            } else {
                *overloaded = true;
                *pending_connection = true;
            }
        }
        for pid in channels.keys().copied().collect::<Vec<_>>() {
            let fd = channels.get(&pid).unwrap().as_raw_fd();
            if read_set.contains(fd) {
                service_child_channel(pid, channels, pool)?;
                if *pending_connection && pool.state(pid) == Some(ChildState::Idle) {
                    dispatch_to_child(pid, channels, pool)?;
                    *pending_connection = false;
                    *overloaded = false;
                }
            }
        }
    }

    match pool.adjust() {
        PoolAction::SpawnOne => {
            let handle = spawn_one()?;
            channels.insert(handle.pid, handle.channel);
            pool.insert(handle.pid, ChildState::Starting);
        }
        PoolAction::KillPid(pid) => {
            kill_child(pid)?;
            pool.set_state(pid, ChildState::Killed);
        }
        PoolAction::None => {}
    }

    Ok(())
}

fn dispatch_to_child(pid: u32, channels: &mut AHashMap<u32, UnixStream>, pool: &mut Pool) -> Result<()> {
    use std::io::{Read, Write};
    let chan = channels.get_mut(&pid).ok_or(DaemonError::ChildDead(pid))?;
    chan.write_all(&Frame::Accept.encode())?;
    let mut buf = [0u8; crate::frame::FRAME_LEN];
    chan.read_exact(&mut buf)?;
    match Frame::decode(&buf)? {
        Frame::Busy(p) if p == pid => {
            pool.set_state(pid, ChildState::Busy);
            Ok(())
        }
        _ => {
            pool.set_state(pid, ChildState::Error);
            Err(DaemonError::Protocol(format!("child {pid} did not confirm busy")))
        }
    }
}

fn service_child_channel(pid: u32, channels: &mut AHashMap<u32, UnixStream>, pool: &mut Pool) -> Result<()> {
    use std::io::Read;
    let chan = channels.get_mut(&pid).ok_or(DaemonError::ChildDead(pid))?;
    let mut buf = [0u8; crate::frame::FRAME_LEN];
    match chan.read_exact(&mut buf) {
        Ok(()) => match Frame::decode(&buf)? {
            Frame::Idle(p) if p == pid => {
                pool.set_state(pid, ChildState::Idle);
                Ok(())
            }
            Frame::Busy(p) if p == pid => {
                pool.set_state(pid, ChildState::Busy);
                Ok(())
            }
            _ => {
                pool.set_state(pid, ChildState::Error);
                Err(DaemonError::Protocol(format!("malformed frame from child {pid}")))
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            pool.remove(pid);
            channels.remove(&pid);
            Ok(())
        }
        Err(e) => Err(DaemonError::Io(e)),
    }
}

fn broadcast_ping(channels: &mut AHashMap<u32, UnixStream>, pool: &mut Pool) -> Result<()> {
    use std::io::Write;
    let mut dead = Vec::new();
    for (pid, chan) in channels.iter_mut() {
        if chan.write_all(&Frame::Ping.encode()).is_err() {
            pool.set_state(*pid, ChildState::Error);
            dead.push(*pid);
        }
    }
    for pid in dead {
        kill_child(pid)?;
    }
    Ok(())
}

/// Closes every child channel, observed by children as EOF (§4.6
/// cancellation/shutdown).
pub fn shutdown(channels: &mut AHashMap<u32, UnixStream>) {
    channels.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_drops_all_channels() {
        let mut channels: AHashMap<u32, UnixStream> = AHashMap::new();
        let (a, b) = UnixStream::pair().unwrap();
        channels.insert(1, a);
        drop(b);
        shutdown(&mut channels);
        assert!(channels.is_empty());
    }
}
