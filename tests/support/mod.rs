// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Hand-written mock external services, shared across the integration
//! tests in this directory.

#![allow(dead_code)]

use async_trait::async_trait;
use ba_mgr::external::{
    AgreementFactory, Application, Governance, Lattice, LatticeError, Network,
    NodeSetCache, NodeSetError, Signer, Ticker, TickerFactory, VerifyResult,
};
use ba_mgr::instance::{Agreement, NotarySet, ReceiverHandle};
use ba_mgr::types::{Block, Crs, Hash, NodeId, Position, RoundConfig, Timestamp, Vote};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn node(byte: u8) -> NodeId {
    NodeId([byte; 32])
}

pub struct MockLattice {
    pub tip_rounds: Mutex<HashMap<u32, u64>>,
    pub next_blocks: Mutex<HashMap<(u64, u32), (u64, Timestamp)>>,
}

impl MockLattice {
    pub fn new() -> Self {
        Self {
            tip_rounds: Mutex::new(HashMap::new()),
            next_blocks: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_tip_round(&self, chain_id: u32, round: u64) {
        self.tip_rounds.lock().unwrap().insert(chain_id, round);
    }

    pub fn set_next_block(&self, round: u64, chain_id: u32, height: u64, time: Timestamp) {
        self.next_blocks
            .lock()
            .unwrap()
            .insert((round, chain_id), (height, time));
    }
}

#[async_trait]
impl Lattice for MockLattice {
    async fn sanity_check(&self, _block: &Block, _strict: bool) -> Result<(), LatticeError> {
        Ok(())
    }

    async fn next_block(
        &self,
        round: u64,
        chain_id: u32,
    ) -> Result<(u64, Timestamp), LatticeError> {
        self.next_blocks
            .lock()
            .unwrap()
            .get(&(round, chain_id))
            .copied()
            .ok_or(LatticeError::Other)
    }

    async fn tip_round(&self, chain_id: u32) -> u64 {
        *self.tip_rounds.lock().unwrap().get(&chain_id).unwrap_or(&0)
    }
}

pub struct AcceptingApplication;

#[async_trait]
impl Application for AcceptingApplication {
    async fn verify_block(&self, _block: &Block) -> VerifyResult {
        VerifyResult::Valid
    }
}

pub struct MockGovernance {
    pub configs: Mutex<HashMap<u64, RoundConfig>>,
    pub crss: Mutex<HashMap<u64, Crs>>,
}

impl MockGovernance {
    pub fn new() -> Self {
        Self {
            configs: Mutex::new(HashMap::new()),
            crss: Mutex::new(HashMap::new()),
        }
    }

    pub fn publish(&self, round: u64, cfg: RoundConfig, crs: Crs) {
        self.configs.lock().unwrap().insert(round, cfg);
        self.crss.lock().unwrap().insert(round, crs);
    }
}

#[async_trait]
impl Governance for MockGovernance {
    async fn config(&self, round: u64) -> Option<RoundConfig> {
        self.configs.lock().unwrap().get(&round).cloned()
    }

    async fn crs(&self, round: u64) -> Option<Crs> {
        self.crss.lock().unwrap().get(&round).copied()
    }
}

pub struct UniformNodeSetCache {
    pub members: BTreeSet<NodeId>,
    pub notary_set_calls: Mutex<Vec<(u64, u32, usize)>>,
}

impl UniformNodeSetCache {
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            members: members.into_iter().collect(),
            notary_set_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NodeSetCache for UniformNodeSetCache {
    async fn node_set(&self, _round: u64) -> Result<Vec<NodeId>, NodeSetError> {
        Ok(self.members.iter().copied().collect())
    }

    async fn notary_set(
        &self,
        round: u64,
        chain_id: u32,
        _crs: Crs,
        size: usize,
    ) -> Result<BTreeSet<NodeId>, NodeSetError> {
        self.notary_set_calls
            .lock()
            .unwrap()
            .push((round, chain_id, size));
        Ok(self.members.iter().take(size).copied().collect())
    }

    async fn leader_node(&self, _position: Position) -> Result<NodeId, NodeSetError> {
        self.members
            .iter()
            .next()
            .copied()
            .ok_or_else(|| NodeSetError("empty node set".into()))
    }
}

pub struct RecordingNetwork {
    pub pulled_votes: Mutex<Vec<Position>>,
    pub pulled_blocks: Mutex<Vec<Hash>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self {
            pulled_votes: Mutex::new(Vec::new()),
            pulled_blocks: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Network for RecordingNetwork {
    async fn pull_votes(&self, position: Position) {
        self.pulled_votes.lock().unwrap().push(position);
    }

    async fn pull_blocks(&self, hashes: &[Hash]) {
        self.pulled_blocks.lock().unwrap().extend_from_slice(hashes);
    }
}

/// A ticker that never fires on its own; tests that need clocked
/// transitions drive `next_state` through the manager directly instead of
/// waiting on driver tasks, keeping these tests deterministic.
pub struct InertTicker;

#[async_trait]
impl Ticker for InertTicker {
    async fn tick(&mut self) {
        std::future::pending::<()>().await
    }
    fn restart(&mut self) {}
    fn stop(&mut self) {}
}

pub struct InertTickerFactory;

impl TickerFactory for InertTickerFactory {
    fn new_ticker(&self, _round: u64, _lambda_ba: Duration) -> Box<dyn Ticker> {
        Box::new(InertTicker)
    }
}

pub struct NoopSigner;

impl Signer for NoopSigner {
    fn sign_vote(&self, _vote: &mut Vote) {}
}

/// A minimal `Agreement` implementation: confirms as soon as its vote
/// count for the current position reaches `threshold`, exposing enough
/// behavior to drive the dispatcher-level scenarios without a real BFT
/// state machine.
pub struct ThresholdAgreement {
    receiver: ReceiverHandle,
    threshold: usize,
    agreement_id: Mutex<Position>,
    votes_seen: AtomicU32,
    confirmed: std::sync::atomic::AtomicBool,
    notify: Arc<tokio::sync::Notify>,
    process_vote_calls: AtomicU32,
    last_notary_set: Mutex<Option<NotarySet>>,
}

impl ThresholdAgreement {
    pub fn new(receiver: ReceiverHandle, threshold: usize) -> Self {
        Self {
            receiver,
            threshold,
            agreement_id: Mutex::new(Position::default()),
            votes_seen: AtomicU32::new(0),
            confirmed: std::sync::atomic::AtomicBool::new(false),
            notify: Arc::new(tokio::sync::Notify::new()),
            process_vote_calls: AtomicU32::new(0),
            last_notary_set: Mutex::new(None),
        }
    }

    pub fn process_vote_call_count(&self) -> u32 {
        self.process_vote_calls.load(Ordering::SeqCst)
    }

    /// The notary set `restart` was most recently called with, if any.
    pub fn last_notary_set(&self) -> Option<NotarySet> {
        self.last_notary_set.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agreement for ThresholdAgreement {
    fn agreement_id(&self) -> Position {
        *self.agreement_id.lock().unwrap()
    }

    fn confirmed(&self) -> bool {
        self.confirmed.load(Ordering::SeqCst)
    }

    fn notify_done(&self) -> Arc<tokio::sync::Notify> {
        self.notify.clone()
    }

    async fn process_vote(&mut self, _vote: Vote) -> ba_mgr::Result<()> {
        self.process_vote_calls.fetch_add(1, Ordering::SeqCst);
        let seen = self.votes_seen.fetch_add(1, Ordering::SeqCst) + 1;
        if seen as usize >= self.threshold {
            self.confirmed.store(true, Ordering::SeqCst);
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn process_block(&mut self, _block: Block) -> ba_mgr::Result<()> {
        Ok(())
    }

    fn update_filter(&self, filter: &mut ba_mgr::filter::VoteFilter) {
        let _ = filter;
    }

    fn next_state(&mut self) -> ba_mgr::Result<()> {
        Ok(())
    }

    fn clocks(&self) -> u32 {
        1
    }

    fn pull_votes(&self) -> bool {
        false
    }

    fn restart(
        &mut self,
        notary_set: NotarySet,
        position: Position,
        _leader: NodeId,
        _crs: Crs,
    ) {
        *self.agreement_id.lock().unwrap() = position;
        *self.last_notary_set.lock().unwrap() = Some(notary_set);
        self.votes_seen.store(0, Ordering::SeqCst);
        self.confirmed.store(false, Ordering::SeqCst);
        let _ = &self.receiver;
    }

    fn stop(&mut self) {
        let round = self.agreement_id.lock().unwrap().round;
        *self.agreement_id.lock().unwrap() = Position::stop(round);
    }
}

pub struct ThresholdAgreementFactory {
    pub threshold: usize,
}

impl AgreementFactory for ThresholdAgreementFactory {
    fn new_agreement(
        &self,
        _chain_id: u32,
        receiver: ReceiverHandle,
        _signer: Arc<dyn Signer>,
    ) -> Box<dyn Agreement> {
        Box::new(ThresholdAgreement::new(receiver, self.threshold))
    }
}

pub fn round_config(begin_time: Timestamp, num_chains: u32) -> RoundConfig {
    RoundConfig {
        begin_time,
        num_chains,
        round_interval: Duration::from_secs(60),
        notary_set_size: 2,
        lambda_ba: Duration::from_millis(250),
    }
}
