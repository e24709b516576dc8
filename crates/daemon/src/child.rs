/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Child-side half of the prefork command protocol (§4.6). The parent
//! side lives in [`crate::parent`]; this module is the loop a forked
//! worker runs on its end of the socketpair.

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{DaemonError, Result};
use crate::frame::{Frame, FRAME_LEN};

/// Soft deadline for a single frame read before the parent gives up on
/// this child and treats it as dead.
pub const TOUT_READ_MAX: Duration = Duration::from_secs(300);

/// How often the parent broadcasts a ping to all children when idle.
pub const TOUT_PING_INTERVAL: Duration = Duration::from_secs(150);

pub fn write_frame(channel: &mut impl Write, frame: Frame) -> Result<()> {
    channel.write_all(&frame.encode())?;
    Ok(())
}

pub fn read_frame(channel: &mut impl Read) -> Result<Frame> {
    let mut buf = [0u8; FRAME_LEN];
    channel.read_exact(&mut buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            DaemonError::Protocol("channel closed mid-frame".into())
        } else {
            DaemonError::Io(e)
        }
    })?;
    Frame::decode(&buf)
}

/// Runs one child's command loop: announce idle, then alternate between
/// waiting for a command and serving one connection per `A` frame.
/// `serve_one` is called once per accepted connection; its result is
/// swallowed into an `Error` state transition rather than killing the
/// worker outright, matching §4.6's "protocol fault" semantics only
/// applying to channel-framing errors, not request-handling errors.
pub fn run<C, F>(channel: &mut C, pid: u32, mut serve_one: F) -> Result<()>
where
    C: Read + Write,
    F: FnMut() -> std::result::Result<(), Box<dyn std::error::Error>>,
{
    write_frame(channel, Frame::Idle(pid))?;
    loop {
        let frame = match read_frame(channel) {
            Ok(f) => f,
            Err(DaemonError::Protocol(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        match frame {
            Frame::Ping => continue,
            Frame::Accept => {
                write_frame(channel, Frame::Busy(pid))?;
                if let Err(e) = serve_one() {
                    tracing::warn!(pid, error = %e, "request handling failed");
                }
                write_frame(channel, Frame::Idle(pid))?;
            }
            Frame::Idle(_) | Frame::Busy(_) => {
                return Err(DaemonError::Protocol("unexpected child-origin frame on child channel".into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockChannel {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.outbound.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn announces_idle_on_start() {
        let mut ch = MockChannel::default();
        ch.inbound.extend(Frame::Ping.encode());
        let res = run(&mut ch, 7, || Ok(()));
        assert!(res.is_ok());
        assert_eq!(&ch.outbound[..FRAME_LEN], &Frame::Idle(7).encode());
    }

    #[test]
    fn accept_frame_drives_busy_then_idle() {
        let mut ch = MockChannel::default();
        ch.inbound.extend(Frame::Accept.encode());
        let mut served = false;
        run(&mut ch, 3, || {
            served = true;
            Ok(())
        })
        .unwrap();
        assert!(served);
        let frames: Vec<Frame> =
            ch.outbound.chunks(FRAME_LEN).map(|c| Frame::decode(c.try_into().unwrap()).unwrap()).collect();
        assert_eq!(frames, vec![Frame::Idle(3), Frame::Busy(3), Frame::Idle(3)]);
    }

    #[test]
    fn channel_eof_ends_loop_cleanly() {
        let mut ch = MockChannel::default();
        let res = run(&mut ch, 1, || Ok(()));
        assert!(res.is_ok());
    }

    #[test]
    fn serve_error_does_not_kill_the_loop() {
        let mut ch = MockChannel::default();
        ch.inbound.extend(Frame::Accept.encode());
        let res = run(&mut ch, 9, || Err("boom".into()));
        assert!(res.is_ok());
    }
}
