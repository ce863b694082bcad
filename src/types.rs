// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Core data model shared by every module: positions, node identities, votes,
//! blocks and agreement results.

use hex::ToHex;
use std::cmp::Ordering;
use std::time::Duration;

/// Unix-epoch milliseconds. Kept as a plain alias rather than a newtype so it
/// composes with `tokio::time::Instant` arithmetic at the call sites that
/// need it (the driver).
pub type Timestamp = i64;

/// 32-byte block hash.
pub type Hash = [u8; 32];

/// `(round, chainID, height)`. Total order within a chain by height; no
/// order across chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub round: u64,
    pub chain_id: u32,
    pub height: u64,
}

impl Position {
    /// A distinguished position whose `chain_id` marks "no active
    /// agreement" / "instance stopped".
    pub const STOP_CHAIN_ID: u32 = u32::MAX;

    pub fn new(round: u64, chain_id: u32, height: u64) -> Self {
        Self {
            round,
            chain_id,
            height,
        }
    }

    /// A `STOP` position for `chain_id` at the given round, used as the
    /// sentinel pushed onto `restart_notary` at the start of a round.
    pub fn stop(round: u64) -> Self {
        Self {
            round,
            chain_id: Self::STOP_CHAIN_ID,
            height: 0,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.chain_id == Self::STOP_CHAIN_ID
    }
}

/// A node's BLS-identity-sized public key. Cryptographic verification of
/// the bytes is out of scope for this crate; it is carried only as an
/// opaque, totally-ordered identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub const ZERO: NodeId = NodeId([0u8; 32]);

    pub fn encode_short_hex(&self) -> String {
        let mut hex = self.0.encode_hex::<String>();
        hex.truncate(16);
        hex
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NodeId").field(&self.encode_short_hex()).finish()
    }
}

/// Common random seed for a round; drives notary-set subsetting and leader
/// selection in the node-set cache.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Crs(pub [u8; 32]);

impl std::fmt::Debug for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hex = self.0.encode_hex::<String>();
        hex.truncate(16);
        f.debug_tuple("Crs").field(&hex).finish()
    }
}

/// Ordered vote phase. The ordering (`Initial < PreCommit < Commit`) is
/// what the vote-dedup filter's frontier relies on (see `DESIGN.md`, Open
/// Question resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VoteType {
    Initial,
    PreCommit,
    Commit,
}

/// Opaque signature bytes. Never validated inside this crate — signing
/// happens behind the `Signer` trait, verification behind the notary-set
/// membership check the inner `Agreement` instance performs.
pub type Signature = [u8; 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub voter: NodeId,
    pub position: Position,
    pub period: u32,
    pub vote_type: VoteType,
    pub block_hash: Hash,
    pub signature: Signature,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub hash: Hash,
    pub position: Position,
    pub proposer: NodeId,
    pub timestamp: Timestamp,
    /// Opaque block body; block execution is out of scope for this crate.
    pub payload: Vec<u8>,
}

/// Bundle emitted by a BA instance on confirmation; used by peers to
/// slow- or fast-sync.
#[derive(Debug, Clone)]
pub struct AgreementResult {
    pub position: Position,
    pub block_hash: Hash,
    pub votes: Vec<Vote>,
}

/// Per-round configuration, immutable once appended to the registry.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    pub begin_time: Timestamp,
    pub num_chains: u32,
    pub round_interval: Duration,
    pub notary_set_size: usize,
    pub lambda_ba: Duration,
}
