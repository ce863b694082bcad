// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! BA Instance Table and the inner `Agreement` black-box contract.
//!
//! The inner state machine is observed only through [`Agreement`]; nothing
//! in this crate assumes how it reaches a decision. Construction is two
//! phase, breaking the cyclic reference between the manager and the
//! instance it owns: a [`ReceiverHandle`]
//! capability — a round counter plus the `restart_notary` channel — is
//! built by the manager first and handed to the instance, so the instance
//! never needs a back-pointer into the manager.

use crate::error::{Error, Result};
use crate::filter::VoteFilter;
use crate::types::{Block, Crs, NodeId, Position, Vote};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};

pub type NotarySet = BTreeSet<NodeId>;

/// Capability handed to an [`Agreement`] implementation at construction so
/// it can signal the owning driver without holding a reference back into
/// the manager. Capacity-1.
#[derive(Clone)]
pub struct ReceiverHandle {
    round: Arc<AtomicU64>,
    restart_notary_tx: mpsc::Sender<Position>,
}

impl ReceiverHandle {
    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Acquire)
    }

    /// Called by the `Agreement` implementation's internal `BlockConfirmed`
    /// event to request a restart at the next height. Non-blocking: the
    /// channel's capacity-1 buffer means a value is always deliverable
    /// without the instance stalling.
    pub fn notify_restart(&self, position: Position) {
        let _ = self.restart_notary_tx.try_send(position);
    }
}

/// The driver-held other half of a [`ReceiverHandle`]: the bounded(1)
/// `restart_notary` channel plus the round counter the receiver publishes
/// into at round start.
pub struct RestartChannel {
    round: Arc<AtomicU64>,
    tx: mpsc::Sender<Position>,
    rx: mpsc::Receiver<Position>,
}

impl RestartChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            round: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
        }
    }

    /// The capability handed to the `Agreement` implementation.
    pub fn handle(&self) -> ReceiverHandle {
        ReceiverHandle {
            round: self.round.clone(),
            restart_notary_tx: self.tx.clone(),
        }
    }

    pub fn set_round(&self, round: u64) {
        self.round.store(round, Ordering::Release);
    }

    /// Pushes the round-start sentinel. The
    /// channel is empty at this point by protocol, so the non-blocking
    /// send is guaranteed to succeed.
    pub fn push_initial_kick(&self, position: Position) {
        let _ = self.tx.try_send(position);
    }

    pub async fn recv(&mut self) -> Option<Position> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Position> {
        self.rx.try_recv().ok()
    }
}

impl Default for RestartChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Black-box contract the inner Byzantine Agreement state machine must
/// satisfy. Implementations live outside this crate.
#[async_trait]
pub trait Agreement: Send + Sync {
    /// Current voting target.
    fn agreement_id(&self) -> Position;

    /// `true` once this instance has decided. Doubles as the non-blocking
    /// half of the `done()` priority-select.
    fn confirmed(&self) -> bool;

    /// Fires (may fire repeatedly, edge-triggered) when the instance
    /// transitions to confirmed. The blocking half of the priority select.
    fn notify_done(&self) -> Arc<Notify>;

    async fn process_vote(&mut self, vote: Vote) -> Result<()>;
    async fn process_block(&mut self, block: Block) -> Result<()>;

    /// Advances the voter's frontier in `filter` to reflect votes this
    /// instance has already accepted, so future stale votes drop before
    /// reaching the instance at all.
    fn update_filter(&self, filter: &mut VoteFilter);

    /// Advances the protocol clock by one state transition.
    fn next_state(&mut self) -> Result<()>;

    /// How many ticker ticks must elapse before the next `next_state` call.
    fn clocks(&self) -> u32;

    /// `true` when the instance believes it is missing votes.
    fn pull_votes(&self) -> bool;

    /// Reinitializes the instance for a new position.
    fn restart(
        &mut self,
        notary_set: NotarySet,
        position: Position,
        leader: NodeId,
        crs: Crs,
    );

    /// Sets `agreement_id` to `STOP` and releases any blocking signals.
    fn stop(&mut self);
}

/// Per-chain mutable state owned by the manager: the inner state machine,
/// its current notary set / CRS (implicit in the `Agreement` impl), and the
/// restart-notification plumbing. Singly owned — only the instance's own
/// driver and dispatcher calls holding the manager's read lock touch it,
/// and only under the instance's own mutex.
pub struct BaInstance {
    pub(crate) inner: Mutex<Box<dyn Agreement>>,
    pub(crate) restart_channel: Mutex<RestartChannel>,
    pub(crate) receiver: ReceiverHandle,
}

impl BaInstance {
    /// Two-phase construction: the caller first builds a [`RestartChannel`],
    /// hands its [`ReceiverHandle`] to the `Agreement` implementation's own
    /// constructor, and then wraps both here.
    pub fn new(inner: Box<dyn Agreement>, channel: RestartChannel) -> Self {
        let receiver = channel.handle();
        Self {
            inner: Mutex::new(inner),
            restart_channel: Mutex::new(channel),
            receiver,
        }
    }

    pub fn receiver(&self) -> ReceiverHandle {
        self.receiver.clone()
    }

    /// Current voting target of the inner state machine.
    pub async fn agreement_id(&self) -> Position {
        self.inner.lock().await.agreement_id()
    }
}

/// Checks the chain-bounds precondition shared by every dispatcher.
pub fn check_chain_id(chain_id: u32, len: usize) -> Result<()> {
    if chain_id as usize >= len {
        return Err(Error::InvalidChainId(chain_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn restart_channel_delivers_initial_kick() {
        let mut channel = RestartChannel::new();
        channel.push_initial_kick(Position::stop(3));
        let received = channel.recv().await.unwrap();
        assert!(received.is_stop());
        assert_eq!(received.round, 3);
    }

    #[test]
    fn check_chain_id_rejects_out_of_range() {
        assert!(check_chain_id(2, 2).is_err());
        assert!(check_chain_id(1, 2).is_ok());
    }
}
