// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the catch-up groups of outdated workers.

use crate::worker::Workers;

/// Identity of a catch-up group within its manager.
pub type GroupId = u64;

/// A cohort of behind workers sharing one catch-up cursor.
///
/// # Description
///
/// `block_number` is the group's fetch watermark: the next range query starts
/// right after it. Workers with similar progress are bucketed together so a
/// single range query serves all of them. The member set may grow while the
/// group lives; each member still keeps its own categorization watermark.
#[derive(Debug)]
pub struct OldWorkerGroup {
    id: GroupId,
    pub block_number: u64,
    pub workers: Workers,
}

impl OldWorkerGroup {
    pub fn new(id: GroupId, block_number: u64, workers: Workers) -> Self {
        Self {
            id,
            block_number,
            workers,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn add_workers(&mut self, workers: Workers) {
        self.workers.append(workers);
    }
}

/// The ordered list of live catch-up groups of one manager.
#[derive(Debug, Default)]
pub struct OldGroupList {
    groups: Vec<OldWorkerGroup>,
}

impl OldGroupList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn push(&mut self, group: OldWorkerGroup) {
        self.groups.push(group);
    }

    pub fn iter(&self) -> impl Iterator<Item = &OldWorkerGroup> {
        self.groups.iter()
    }

    pub fn get_mut(&mut self, id: GroupId) -> Option<&mut OldWorkerGroup> {
        self.groups.iter_mut().find(|group| group.id == id)
    }

    /// First group whose cursor is at or past the given block.
    ///
    /// A newly registered behind set joins such a group instead of spawning
    /// a redundant one: the group unions addresses on every pass, so the new
    /// members are picked up on its next iteration.
    pub fn first_group_at_least(&mut self, block_number: u64) -> Option<&mut OldWorkerGroup> {
        self.groups
            .iter_mut()
            .find(|group| group.block_number >= block_number)
    }

    /// Removes a group by identity, preserving the order of the rest.
    pub fn remove(&mut self, id: GroupId) -> Option<OldWorkerGroup> {
        let position = self.groups.iter().position(|group| group.id == id)?;
        Some(self.groups.remove(position))
    }
}
