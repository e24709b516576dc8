/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use crate::error::{DaemonError, Result};

pub const FRAME_LEN: usize = 6;

/// Fixed 6-byte command frames exchanged on a child's private socketpair
/// channel (§4.6). Parent→child frames carry no payload; child→parent
/// frames carry the child's own pid so the parent can correlate a
/// readiness event with one of its tracked children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Accept,
    Ping,
    Idle(u32),
    Busy(u32),
}

impl Frame {
    pub fn encode(self) -> [u8; FRAME_LEN] {
        match self {
            Frame::Accept => [b'A', 0, 0, 0, 0, b'\n'],
            Frame::Ping => [b'P', 0, 0, 0, 0, b'\n'],
            Frame::Idle(pid) => encode_pid(b'I', pid),
            Frame::Busy(pid) => encode_pid(b'B', pid),
        }
    }

    pub fn decode(buf: &[u8; FRAME_LEN]) -> Result<Self> {
        if buf[FRAME_LEN - 1] != b'\n' {
            return Err(DaemonError::Protocol("frame missing trailing newline".into()));
        }
        let pid = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        match buf[0] {
            b'A' => Ok(Frame::Accept),
            b'P' => Ok(Frame::Ping),
            b'I' => Ok(Frame::Idle(pid)),
            b'B' => Ok(Frame::Busy(pid)),
            other => Err(DaemonError::Protocol(format!("unknown frame tag {other:#x}"))),
        }
    }
}

fn encode_pid(tag: u8, pid: u32) -> [u8; FRAME_LEN] {
    let p = pid.to_be_bytes();
    [tag, p[0], p[1], p[2], p[3], b'\n']
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_roundtrips() {
        let encoded = Frame::Accept.encode();
        assert_eq!(encoded, [b'A', 0, 0, 0, 0, b'\n']);
        assert_eq!(Frame::decode(&encoded).unwrap(), Frame::Accept);
    }

    #[test]
    fn idle_carries_big_endian_pid() {
        let encoded = Frame::Idle(0x0102_0304).encode();
        assert_eq!(encoded, [b'I', 0x01, 0x02, 0x03, 0x04, b'\n']);
        assert_eq!(Frame::decode(&encoded).unwrap(), Frame::Idle(0x0102_0304));
    }

    #[test]
    fn busy_roundtrips() {
        let encoded = Frame::Busy(42).encode();
        assert_eq!(Frame::decode(&encoded).unwrap(), Frame::Busy(42));
    }

    #[test]
    fn missing_newline_is_rejected() {
        let bad = [b'A', 0, 0, 0, 0, b'X'];
        assert!(Frame::decode(&bad).is_err());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bad = [b'Z', 0, 0, 0, 0, b'\n'];
        assert!(Frame::decode(&bad).is_err());
    }
}
