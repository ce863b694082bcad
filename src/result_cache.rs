// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Result Cache: a bounded set of already-processed agreement-result
//! positions. Eviction on overflow is arbitrary — LRU is
//! unnecessary because collisions are positional and monotonically
//! progress; a fixed-capacity ring of recent positions is a clean
//! substitute.

use crate::types::Position;
use std::collections::{HashSet, VecDeque};

pub struct ProcessedResultSet {
    capacity: usize,
    order: VecDeque<Position>,
    set: HashSet<Position>,
}

impl ProcessedResultSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            set: HashSet::with_capacity(capacity + 1),
        }
    }

    /// Returns `true` the first time `position` is touched; `false` on
    /// subsequent calls until [`Self::untouch`] is called or the entry is
    /// evicted.
    pub fn touch(&mut self, position: Position) -> bool {
        if !self.set.insert(position) {
            return false;
        }
        self.order.push_back(position);

        while self.set.len() > self.capacity {
            // Arbitrary eviction: drop the oldest still-tracked entry.
            while let Some(evicted) = self.order.pop_front() {
                if self.set.remove(&evicted) {
                    break;
                }
            }
        }
        true
    }

    pub fn untouch(&mut self, position: &Position) {
        self.set.remove(position);
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
