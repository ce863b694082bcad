// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Error taxonomy. Recoverable conditions are returned as `Error`; invariant
//! violations go through [`fatal`] and abort the process.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("chain id {0} is beyond the current BA instance table")]
    InvalidChainId(u32),

    #[error("block rejected: {0}")]
    InvalidBlock(String),

    #[error(
        "appendConfig called out of order: expected round {expected}, got {got}"
    )]
    RoundNotIncreasing { expected: u64, got: u64 },

    #[error("inner agreement instance rejected the call: {0}")]
    Agreement(String),

    #[error("lattice call failed: {0}")]
    Lattice(String),

    #[error("node-set cache call failed: {0}")]
    NodeSetCache(String),

    #[error("manager is shutting down")]
    Canceled,
}

/// Invariant violations that denote programmer or protocol-state
/// corruption. These are never returned to a caller: they are logged and
/// the process is aborted — invariant violations are treated as fatal.
pub mod fatal {
    use crate::types::Position;

    pub fn round_out_of_range(round: u64, init_round: u64) -> ! {
        tracing::error!(
            event = "fatal.round_out_of_range",
            round,
            init_round,
            "getConfig called with a round before the manager's init round"
        );
        panic!(
            "BA-Mgr: round {round} is before init round {init_round}; this is a contract violation"
        );
    }

    pub fn node_set_cache_corrupt(
        round: u64,
        chain_id: u32,
        reason: &str,
    ) -> ! {
        tracing::error!(
            event = "fatal.node_set_cache",
            round,
            chain_id,
            reason,
            "node-set cache lookup failed while preparing a round"
        );
        panic!(
            "BA-Mgr: node-set cache corrupted for round {round} chain {chain_id}: {reason}"
        );
    }

    pub fn governance_missing(round: u64) -> ! {
        tracing::error!(
            event = "fatal.governance_missing",
            round,
            "governance has no data for a round the manager must reach"
        );
        panic!("BA-Mgr: governance data missing for round {round}");
    }

    #[allow(dead_code)]
    pub fn unexpected_stop(position: Position) -> ! {
        tracing::error!(
            event = "fatal.unexpected_stop",
            ?position,
            "encountered a STOP position where a concrete position was required"
        );
        panic!("BA-Mgr: unexpected STOP position {position:?}");
    }
}

pub type Result<T> = std::result::Result<T, Error>;
