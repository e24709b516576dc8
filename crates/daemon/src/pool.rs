/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashMap;

/// Per-child lifecycle state (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Starting,
    Idle,
    Busy,
    Killed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAction {
    SpawnOne,
    KillPid(u32),
    None,
}

/// Tracks every live child's state and decides pool-size adjustments.
/// Holds no file descriptors or OS handles — those live in the parent's
/// main loop, which is the only piece of this crate that needs real
/// sockets and is therefore not covered by these unit tests.
#[derive(Debug, Default)]
pub struct Pool {
    children: AHashMap<u32, ChildState>,
    pub min_idle: usize,
    pub max_idle: usize,
    pub min_children: usize,
    pub max_children: usize,
}

impl Pool {
    pub fn new(min_idle: usize, max_idle: usize, min_children: usize, max_children: usize) -> Self {
        Self { children: AHashMap::new(), min_idle, max_idle, min_children, max_children }
    }

    pub fn insert(&mut self, pid: u32, state: ChildState) {
        self.children.insert(pid, state);
    }

    pub fn remove(&mut self, pid: u32) {
        self.children.remove(&pid);
    }

    pub fn set_state(&mut self, pid: u32, state: ChildState) {
        if let Some(entry) = self.children.get_mut(&pid) {
            *entry = state;
        }
    }

    pub fn state(&self, pid: u32) -> Option<ChildState> {
        self.children.get(&pid).copied()
    }

    pub fn num_servers(&self) -> usize {
        self.children.len()
    }

    pub fn num_idle(&self) -> usize {
        self.children.values().filter(|s| **s == ChildState::Idle).count()
    }

    /// The "lowest-pid IDLE child" dispatch policy (§4.6).
    pub fn lowest_pid_idle(&self) -> Option<u32> {
        self.children
            .iter()
            .filter(|(_, s)| **s == ChildState::Idle)
            .map(|(pid, _)| *pid)
            .min()
    }

    pub fn highest_pid_idle(&self) -> Option<u32> {
        self.children
            .iter()
            .filter(|(_, s)| **s == ChildState::Idle)
            .map(|(pid, _)| *pid)
            .max()
    }

    /// Decides the (at most one) pool-size change for this pass, per the
    /// "only one child is added or removed per pass" rule (§4.6).
    pub fn adjust(&self) -> PoolAction {
        let idle = self.num_idle();
        let servers = self.num_servers();
        if idle < self.min_idle && servers < self.max_children {
            return PoolAction::SpawnOne;
        }
        if idle > self.max_idle && servers > self.min_children {
            if let Some(pid) = self.highest_pid_idle() {
                return PoolAction::KillPid(pid);
            }
        }
        PoolAction::None
    }

    pub fn error_children(&self) -> Vec<u32> {
        self.children.iter().filter(|(_, s)| **s == ChildState::Error).map(|(pid, _)| *pid).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(idle: usize, busy: usize, min_idle: usize, max_idle: usize, min_c: usize, max_c: usize) -> Pool {
        let mut p = Pool::new(min_idle, max_idle, min_c, max_c);
        let mut pid = 1;
        for _ in 0..idle {
            p.insert(pid, ChildState::Idle);
            pid += 1;
        }
        for _ in 0..busy {
            p.insert(pid, ChildState::Busy);
            pid += 1;
        }
        p
    }

    #[test]
    fn spawns_when_below_min_idle() {
        let pool = pool_with(1, 3, 2, 10, 1, 20);
        assert_eq!(pool.adjust(), PoolAction::SpawnOne);
    }

    #[test]
    fn does_not_spawn_past_max_children() {
        let pool = pool_with(1, 19, 2, 10, 1, 20);
        assert_eq!(pool.adjust(), PoolAction::None);
    }

    #[test]
    fn kills_highest_pid_idle_when_above_max_idle() {
        let pool = pool_with(5, 0, 1, 3, 1, 20);
        let highest = pool.highest_pid_idle().unwrap();
        assert_eq!(pool.adjust(), PoolAction::KillPid(highest));
    }

    #[test]
    fn does_not_kill_below_min_children() {
        let pool = pool_with(5, 0, 1, 3, 5, 20);
        assert_eq!(pool.adjust(), PoolAction::None);
    }

    #[test]
    fn steady_state_takes_no_action() {
        let pool = pool_with(2, 3, 1, 4, 1, 20);
        assert_eq!(pool.adjust(), PoolAction::None);
    }

    #[test]
    fn lowest_pid_idle_picks_smallest_pid() {
        let mut pool = Pool::new(0, 10, 1, 10);
        pool.insert(5, ChildState::Idle);
        pool.insert(2, ChildState::Idle);
        pool.insert(8, ChildState::Busy);
        assert_eq!(pool.lowest_pid_idle(), Some(2));
    }
}
