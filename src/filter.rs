// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Vote-Deduplication Filter: one per chain, rejects replayed/stale votes
//! before they reach the inner BA instance.

use crate::types::{NodeId, Vote, VoteType};
use std::collections::HashMap;

/// Tracks, per voter, the highest `(height, period, vote_type)` frontier
/// this chain has accepted. A vote for an earlier height, or the same
/// height but an earlier-or-equal `(period, vote_type)`, is stale; a vote
/// for a later height always starts fresh regardless of its own
/// `(period, vote_type)`, since a restart resets every voter's frontier
/// for that chain to the new position.
#[derive(Debug, Default)]
pub struct VoteFilter {
    frontier: HashMap<NodeId, (u64, u32, VoteType)>,
}

impl VoteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-mutating check: would `vote` be rejected as a replay/stale vote?
    pub fn is_duplicate(&self, vote: &Vote) -> bool {
        match self.frontier.get(&vote.voter) {
            Some(&(height, period, vote_type)) => match vote.position.height.cmp(&height) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => {
                    (vote.period, vote.vote_type) <= (period, vote_type)
                }
            },
            None => false,
        }
    }

    /// Advances the voter's frontier to `vote`'s `(height, period,
    /// vote_type)`, letting future stale votes drop cheaply without
    /// touching the inner BA instance. Called only after the instance
    /// accepts the vote. A vote for a new height replaces the frontier
    /// outright rather than being folded into a max, since height order
    /// dominates period/type order.
    pub fn advance(&mut self, vote: &Vote) {
        let height = vote.position.height;
        let entry = self
            .frontier
            .entry(vote.voter)
            .or_insert((height, vote.period, vote.vote_type));
        if height > entry.0 {
            *entry = (height, vote.period, vote.vote_type);
        } else if height == entry.0 && (vote.period, vote.vote_type) > (entry.1, entry.2) {
            entry.1 = vote.period;
            entry.2 = vote.vote_type;
        }
    }
}
