// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! External collaborators. Every trait here is an interface only: this
//! crate ships no implementation, mirroring how `dusk-consensus` treats
//! `Operations`/`Database` as generic parameters supplied by the embedding
//! node.

use crate::types::{Block, Crs, Hash, NodeId, Position, Timestamp};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LatticeError {
    /// Sanity-checking this block is premature; retry once more of the DAG
    /// has arrived. Maps to "not valid yet".
    #[error("sanity check must be retried later")]
    RetrySanityCheckLater,
    #[error("lattice call failed")]
    Other,
}

/// The local per-chain DAG of confirmed blocks.
#[async_trait]
pub trait Lattice: Send + Sync {
    async fn sanity_check(
        &self,
        block: &Block,
        strict: bool,
    ) -> Result<(), LatticeError>;

    /// Earliest acceptable next block for this chain: `(height, time)`.
    async fn next_block(
        &self,
        round: u64,
        chain_id: u32,
    ) -> Result<(u64, Timestamp), LatticeError>;

    /// Highest round for which this chain has a block in the local DAG.
    async fn tip_round(&self, chain_id: u32) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    Valid,
    Invalid,
    RetryLater,
}

#[async_trait]
pub trait Application: Send + Sync {
    async fn verify_block(&self, block: &Block) -> VerifyResult;
}

/// Governance data for a round. A missing round accessed through the
/// `*_with_panic` helpers below reflects corrupt state and is fatal — it
/// must exist for any round the manager is asked to reach.
#[async_trait]
pub trait Governance: Send + Sync {
    async fn config(&self, round: u64) -> Option<crate::types::RoundConfig>;
    async fn crs(&self, round: u64) -> Option<Crs>;
}

pub async fn config_with_panic(
    gov: &(dyn Governance),
    round: u64,
) -> crate::types::RoundConfig {
    match gov.config(round).await {
        Some(cfg) => cfg,
        None => crate::error::fatal::governance_missing(round),
    }
}

pub async fn crs_with_panic(gov: &(dyn Governance), round: u64) -> Crs {
    match gov.crs(round).await {
        Some(crs) => crs,
        None => crate::error::fatal::governance_missing(round),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("node-set cache error: {0}")]
pub struct NodeSetError(pub String);

/// Cryptographic notary-set membership cache, keyed by round and CRS.
#[async_trait]
pub trait NodeSetCache: Send + Sync {
    async fn node_set(&self, round: u64) -> Result<Vec<NodeId>, NodeSetError>;

    /// Selects `size` nodes from the node set for `(round, chain_id)` using
    /// `crs` as the sortition target.
    async fn notary_set(
        &self,
        round: u64,
        chain_id: u32,
        crs: Crs,
        size: usize,
    ) -> Result<BTreeSet<NodeId>, NodeSetError>;

    async fn leader_node(
        &self,
        position: Position,
    ) -> Result<NodeId, NodeSetError>;
}

/// Attaches this node's signature to outgoing votes. Opaque: cryptographic
/// primitives are out of scope for this crate.
pub trait Signer: Send + Sync {
    fn sign_vote(&self, vote: &mut crate::types::Vote);
}

#[async_trait]
pub trait Network: Send + Sync {
    async fn pull_votes(&self, position: Position);
    async fn pull_blocks(&self, hashes: &[Hash]);
}

/// A periodic pulse source with period `lambda_ba`, used to clock a chain's
/// BA state transitions. `tick` resolves once per pulse; it does not queue
/// pulses across restarts (see `DESIGN.md`, ticker Open Question).
#[async_trait]
pub trait Ticker: Send + Sync {
    async fn tick(&mut self);
    fn restart(&mut self);
    fn stop(&mut self);
}

/// Produces a chain's [`Ticker`], re-derived from governance whenever
/// `lambda_ba` changes for that chain's round.
pub trait TickerFactory: Send + Sync {
    fn new_ticker(
        &self,
        round: u64,
        lambda_ba: std::time::Duration,
    ) -> Box<dyn Ticker>;
}

/// Builds the inner BA state machine for a newly appearing chainID. The
/// state machine itself is a black box; this crate only needs to be able
/// to mint one and hand it its restart-notification and vote-signing
/// capabilities, since casting this node's own votes happens inside that
/// black box, not in this crate.
pub trait AgreementFactory: Send + Sync {
    fn new_agreement(
        &self,
        chain_id: u32,
        receiver: crate::instance::ReceiverHandle,
        signer: std::sync::Arc<dyn Signer>,
    ) -> Box<dyn crate::instance::Agreement>;
}
