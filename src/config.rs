// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Round Config Registry: an append-only list of per-round configurations
//! indexed by `round - initRound`.

use crate::error::{fatal, Error, Result};
use crate::types::{Crs, RoundConfig, Timestamp};
use std::time::Duration;
use tokio::sync::RwLock;

/// Bounded capacity of the processed-agreement-result cache.
pub const MAX_RESULT_CACHE: usize = 100;

/// How long the driver sleeps between polls while waiting for a round's
/// config to be appended.
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll interval while waiting for the lattice tip / next block height
/// during round-end and restart handling.
pub const LATTICE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Jitter window multiplier applied to a chain's BA tick period when
/// computing its biased round-begin time.
pub const ROUND_BEGIN_JITTER_TICKS: u32 = 4;

/// Number of ticker pulses drained after waking from the biased
/// round-begin sleep.
pub const POST_JITTER_TICKER_DRAINS: usize = 2;

struct ConfigEntry {
    cfg: RoundConfig,
    crs: Crs,
}

struct RegistryState {
    configs: Vec<ConfigEntry>,
    last_end_time: Timestamp,
}

/// Append-only per-round configuration list, guarded by a single
/// reader/writer lock — the simplest mapping of the protocol's "schedule of
/// schedules" for how rounds get configured.
pub struct ConfigRegistry {
    init_round: u64,
    state: RwLock<RegistryState>,
}

/// Outcome of a successful [`ConfigRegistry::append`], telling the caller
/// which new chain ids (if any) now need a fresh BA instance, vote filter
/// and — if the manager is running — a driver task.
pub struct AppendOutcome {
    pub old_num_chains: u32,
    pub new_num_chains: u32,
}

impl ConfigRegistry {
    pub fn new(init_round: u64, init_round_begin_time: Timestamp) -> Self {
        Self {
            init_round,
            state: RwLock::new(RegistryState {
                configs: Vec::new(),
                last_end_time: init_round_begin_time,
            }),
        }
    }

    pub fn init_round(&self) -> u64 {
        self.init_round
    }

    /// Returns `None` if `round` is beyond the last appended config.
    /// Fails fatally if `round < initRound` — a contract violation.
    pub async fn get_config(&self, round: u64) -> Option<RoundConfig> {
        if round < self.init_round {
            fatal::round_out_of_range(round, self.init_round);
        }
        let idx = (round - self.init_round) as usize;
        let st = self.state.read().await;
        st.configs.get(idx).map(|e| e.cfg.clone())
    }

    /// Returns the CRS appended alongside `round`'s config, if any.
    pub async fn get_crs(&self, round: u64) -> Option<Crs> {
        if round < self.init_round {
            fatal::round_out_of_range(round, self.init_round);
        }
        let idx = (round - self.init_round) as usize;
        let st = self.state.read().await;
        st.configs.get(idx).map(|e| e.crs)
    }

    /// Must be called with `round == initRound + len(configs)`, else
    /// returns `RoundNotIncreasing` and leaves the registry unchanged.
    pub async fn append(
        &self,
        round: u64,
        cfg: RoundConfig,
        crs: Crs,
    ) -> Result<AppendOutcome> {
        let mut st = self.state.write().await;
        let expected = self.init_round + st.configs.len() as u64;
        if round != expected {
            return Err(Error::RoundNotIncreasing {
                expected,
                got: round,
            });
        }

        let old_num_chains =
            st.configs.last().map(|e| e.cfg.num_chains).unwrap_or(0);
        let new_num_chains = cfg.num_chains;

        st.last_end_time = cfg.begin_time
            + i64::try_from(cfg.round_interval.as_millis())
                .unwrap_or(i64::MAX);
        st.configs.push(ConfigEntry { cfg, crs });

        tracing::debug!(
            event = "registry.append_config",
            round,
            old_num_chains,
            new_num_chains,
        );

        Ok(AppendOutcome {
            old_num_chains,
            new_num_chains,
        })
    }

    pub async fn last_end_time(&self) -> Timestamp {
        self.state.read().await.last_end_time
    }
}
