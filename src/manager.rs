// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! The BA-Mgr itself: owns the round config registry, the BA instance
//! table, the per-chain vote filters, and the chain drivers spawned for
//! them. A single reader/writer lock guards this inventory; the
//! processed-result cache is deliberately a separate lock.

use crate::config::ConfigRegistry;
use crate::driver::{run_chain_driver, ChainDriverCtx};
use crate::error::{Error, Result};
use crate::filter::VoteFilter;
use crate::instance::{check_chain_id, Agreement, BaInstance, RestartChannel};
use crate::result_cache::ProcessedResultSet;
use crate::services::Services;
use crate::types::{AgreementResult, Block, Position, RoundConfig, Timestamp, Vote};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Inventory {
    instances: Vec<Arc<BaInstance>>,
    filters: Vec<Arc<Mutex<VoteFilter>>>,
    drivers: Vec<JoinHandle<()>>,
    is_running: bool,
}

/// Orchestrates every chain's Byzantine Agreement instance for one node.
pub struct BaMgr {
    configs: Arc<ConfigRegistry>,
    services: Arc<Services>,
    inventory: RwLock<Inventory>,
    /// Explicitly outside `inventory`'s lock: concurrent
    /// use from anywhere but the caller's own serialized result-handling
    /// path is a contract violation at the layer above, not something this
    /// lock needs to arbitrate.
    result_cache: Mutex<ProcessedResultSet>,
    cancel: CancellationToken,
}

impl BaMgr {
    pub fn new(init_round: u64, init_round_begin_time: Timestamp, services: Arc<Services>) -> Self {
        Self {
            configs: Arc::new(ConfigRegistry::new(init_round, init_round_begin_time)),
            services,
            inventory: RwLock::new(Inventory {
                instances: Vec::new(),
                filters: Vec::new(),
                drivers: Vec::new(),
                is_running: false,
            }),
            result_cache: Mutex::new(ProcessedResultSet::new(crate::config::MAX_RESULT_CACHE)),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawns a driver task for every already-registered chain. Idempotent
    /// only in the sense that calling it twice spawns duplicate drivers —
    /// callers must call it at most once. Chains appended after this point
    /// are gated on "is the manager already running" instead.
    pub async fn start(self: &Arc<Self>) {
        let mut inv = self.inventory.write().await;
        inv.is_running = true;
        for chain_id in 0..inv.instances.len() as u32 {
            let handle = self.spawn_driver(chain_id, &inv.instances[chain_id as usize], &inv.filters[chain_id as usize]);
            inv.drivers.push(handle);
        }
    }

    fn spawn_driver(
        self: &Arc<Self>,
        chain_id: u32,
        instance: &Arc<BaInstance>,
        filter_slot: &Arc<Mutex<VoteFilter>>,
    ) -> JoinHandle<()> {
        let ctx = ChainDriverCtx {
            chain_id,
            configs: self.configs.clone(),
            instance: instance.clone(),
            filter_slot: filter_slot.clone(),
            services: self.services.clone(),
            cancel: self.cancel.clone(),
        };
        tokio::spawn(run_chain_driver(ctx))
    }

    /// `appendConfig`.
    pub async fn append_config(
        self: &Arc<Self>,
        round: u64,
        cfg: RoundConfig,
        crs: crate::types::Crs,
    ) -> Result<()> {
        let outcome = self.configs.append(round, cfg.clone(), crs).await?;

        let mut inv = self.inventory.write().await;
        for chain_id in outcome.old_num_chains..outcome.new_num_chains {
            let notary_set = self
                .services
                .node_set_cache
                .notary_set(round, chain_id, crs, cfg.notary_set_size)
                .await
                .unwrap_or_else(|e| {
                    crate::error::fatal::node_set_cache_corrupt(round, chain_id, &e.0)
                });
            let leader = self
                .services
                .node_set_cache
                .leader_node(Position::new(round, chain_id, 0))
                .await
                .unwrap_or_else(|e| {
                    crate::error::fatal::node_set_cache_corrupt(round, chain_id, &e.0)
                });

            let channel = RestartChannel::new();
            let receiver = channel.handle();
            let mut inner = self.services.agreement_factory.new_agreement(
                chain_id,
                receiver,
                self.services.signer.clone(),
            );
            inner.restart(notary_set, Position::new(round, chain_id, 0), leader, crs);

            let instance = Arc::new(BaInstance::new(inner, channel));
            let filter_slot = Arc::new(Mutex::new(VoteFilter::new()));

            info!(chain_id, round, "registered new BA instance");

            if inv.is_running {
                let handle = self.spawn_driver(chain_id, &instance, &filter_slot);
                inv.drivers.push(handle);
            }
            inv.instances.push(instance);
            inv.filters.push(filter_slot);
        }

        Ok(())
    }

    /// `processVote`.
    pub async fn process_vote(&self, vote: Vote) -> Result<()> {
        let inv = self.inventory.read().await;
        check_chain_id(vote.position.chain_id, inv.instances.len())?;
        let idx = vote.position.chain_id as usize;

        let mut filter = inv.filters[idx].lock().await;
        if filter.is_duplicate(&vote) {
            debug!(chain_id = idx, position = ?vote.position, "dropping duplicate vote");
            return Ok(());
        }

        let mut inner = inv.instances[idx].inner.lock().await;
        inner.process_vote(vote.clone()).await?;
        inner.update_filter(&mut filter);
        Ok(())
    }

    /// `processBlock`.
    pub async fn process_block(&self, block: Block) -> Result<()> {
        let inv = self.inventory.read().await;
        check_chain_id(block.position.chain_id, inv.instances.len())?;
        let idx = block.position.chain_id as usize;
        inv.instances[idx].inner.lock().await.process_block(block).await
    }

    /// `processAgreementResult`: slow-sync replays votes for the
    /// instance's current position; fast-sync restarts the instance at a
    /// newer one.
    pub async fn process_agreement_result(&self, result: AgreementResult) -> Result<()> {
        let inv = self.inventory.read().await;
        check_chain_id(result.position.chain_id, inv.instances.len())?;
        let idx = result.position.chain_id as usize;
        let instance = &inv.instances[idx];

        let agreement_id = instance.inner.lock().await.agreement_id();
        if agreement_id.is_stop() {
            return Ok(());
        }

        if result.position == agreement_id {
            let confirmed = instance.inner.lock().await.confirmed();
            if !confirmed {
                let mut filter = inv.filters[idx].lock().await;
                let mut inner = instance.inner.lock().await;
                for vote in &result.votes {
                    if !filter.is_duplicate(vote) {
                        inner.process_vote(vote.clone()).await?;
                        inner.update_filter(&mut filter);
                    }
                }
            }
            return Ok(());
        }

        if result.position > agreement_id {
            let round = result.position.round;
            let crs = crate::external::crs_with_panic(&*self.services.governance, round).await;
            let cfg = crate::external::config_with_panic(&*self.services.governance, round).await;

            let notary_set = self
                .services
                .node_set_cache
                .notary_set(round, idx as u32, crs, cfg.notary_set_size)
                .await
                .unwrap_or_else(|e| {
                    crate::error::fatal::node_set_cache_corrupt(round, idx as u32, &e.0)
                });

            {
                let mut filter = inv.filters[idx].lock().await;
                let mut inner = instance.inner.lock().await;
                for vote in &result.votes {
                    if !filter.is_duplicate(vote) {
                        inner.process_vote(vote.clone()).await?;
                        inner.update_filter(&mut filter);
                    }
                }
            }

            self.services.network.pull_blocks(&[result.block_hash]).await;

            let leader = self
                .services
                .node_set_cache
                .leader_node(result.position)
                .await
                .unwrap_or_else(|e| {
                    crate::error::fatal::node_set_cache_corrupt(round, idx as u32, &e.0)
                });

            instance
                .inner
                .lock()
                .await
                .restart(notary_set, result.position, leader, crs);

            return Ok(());
        }

        let result_position = result.position;
        debug!(
            chain_id = idx,
            ?result_position,
            ?agreement_id,
            "dropping stale agreement result"
        );
        Ok(())
    }

    /// First-seen tracking for agreement results, independent of the
    /// instance inventory lock.
    pub async fn touch_agreement_result(&self, position: Position) -> bool {
        self.result_cache.lock().await.touch(position)
    }

    pub async fn untouch_agreement_result(&self, position: &Position) {
        self.result_cache.lock().await.untouch(position);
    }

    /// `stop()`: signal cancellation, call `stop()` on
    /// every instance under the lock, release it, then join every driver.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handles = {
            let mut inv = self.inventory.write().await;
            for instance in &inv.instances {
                instance.inner.lock().await.stop();
            }
            inv.is_running = false;
            std::mem::take(&mut inv.drivers)
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "chain driver task panicked during shutdown");
            }
        }
    }

    pub async fn num_chains(&self) -> usize {
        self.inventory.read().await.instances.len()
    }
}
