// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Per-Chain Round Driver — the heart of the system.
//! One cooperative `tokio::task` per chain: waits for config, sleeps to a
//! biased round-begin time, decides notary membership, drives the BA
//! through clocked states until confirmation, then restarts it at the
//! correct `(round, chainID, height)`.

use crate::config::{
    CONFIG_POLL_INTERVAL, LATTICE_POLL_INTERVAL, POST_JITTER_TICKER_DRAINS,
    ROUND_BEGIN_JITTER_TICKS,
};
use crate::error::Error;
use crate::external::Ticker;
use crate::filter::VoteFilter;
use crate::instance::BaInstance;
use crate::services::Services;
use crate::types::{Position, RoundConfig, Timestamp};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// Everything a chain's driver task needs, shared with the rest of the
/// manager through `Arc`s it never mutates the identity of.
pub struct ChainDriverCtx {
    pub chain_id: u32,
    pub configs: Arc<crate::config::ConfigRegistry>,
    pub instance: Arc<BaInstance>,
    pub filter_slot: Arc<Mutex<VoteFilter>>,
    pub services: Arc<Services>,
    pub cancel: CancellationToken,
}

/// Runs the chain's round loop until the outer context is cancelled.
pub async fn run_chain_driver(ctx: ChainDriverCtx) {
    let mut next_round = ctx.configs.init_round();
    let mut tick_duration: Option<Duration> = None;
    let mut ticker: Option<Box<dyn Ticker>> = None;

    loop {
        if ctx.cancel.is_cancelled() {
            debug!(chain_id = ctx.chain_id, "driver cancelled before round prep");
            return;
        }

        // Phase A — round preparation (`checkRound`).
        let cfg = match wait_for_config(&ctx, next_round).await {
            Some(cfg) => cfg,
            None => return, // cancelled while waiting
        };
        let round_begin_time = cfg.begin_time;
        let round_end_time = round_begin_time
            + i64::try_from(cfg.round_interval.as_millis()).unwrap_or(i64::MAX);
        let current_round = next_round;
        next_round += 1;

        if ctx.chain_id >= cfg.num_chains {
            // Phase B — disabled branch.
            debug!(
                chain_id = ctx.chain_id,
                round = current_round,
                "chain disabled for this round"
            );
            if sleep_until_cancellable(&ctx, round_end_time).await {
                return;
            }
            continue;
        }

        let crs = ctx
            .configs
            .get_crs(current_round)
            .await
            .expect("crs is appended alongside its round's config");

        let notary_set = ctx
            .services
            .node_set_cache
            .notary_set(
                current_round,
                ctx.chain_id,
                crs,
                cfg.notary_set_size,
            )
            .await
            .unwrap_or_else(|e| {
                crate::error::fatal::node_set_cache_corrupt(
                    current_round,
                    ctx.chain_id,
                    &e.0,
                )
            });
        let is_notary = notary_set.contains(&ctx.services.node_id);

        if tick_duration != Some(cfg.lambda_ba) {
            ticker = Some(
                ctx.services
                    .ticker_factory
                    .new_ticker(current_round, cfg.lambda_ba),
            );
            tick_duration = Some(cfg.lambda_ba);
        }
        let ticker = ticker.as_deref_mut().expect("ticker set above");

        info!(
            chain_id = ctx.chain_id,
            round = current_round,
            is_notary,
            notary_set_size = notary_set.len(),
            "entering round execution"
        );

        // Phase C — round execution.
        let outcome = run_round_execution(
            &ctx,
            current_round,
            round_begin_time,
            round_end_time,
            tick_duration.unwrap(),
            ticker,
        )
        .await;

        match outcome {
            RoundOutcome::Cancelled => return,
            RoundOutcome::RoundOver => continue,
            RoundOutcome::AgreementFailed(e) => {
                error!(
                    chain_id = ctx.chain_id,
                    round = current_round,
                    error = %e,
                    "agreement state machine failed; halting this chain's driver"
                );
                return;
            }
        }
    }
}

async fn wait_for_config(
    ctx: &ChainDriverCtx,
    round: u64,
) -> Option<RoundConfig> {
    loop {
        if let Some(cfg) = ctx.configs.get_config(round).await {
            return Some(cfg);
        }
        tokio::select! {
            _ = tokio::time::sleep(CONFIG_POLL_INTERVAL) => {}
            _ = ctx.cancel.cancelled() => return None,
        }
    }
}

/// Sleeps until `target_ms` (absolute wall-clock), cancellable. Returns
/// `true` if cancelled.
async fn sleep_until_cancellable(
    ctx: &ChainDriverCtx,
    target_ms: Timestamp,
) -> bool {
    let now = now_ms();
    if target_ms > now {
        let dur = Duration::from_millis((target_ms - now) as u64);
        tokio::select! {
            _ = tokio::time::sleep(dur) => false,
            _ = ctx.cancel.cancelled() => true,
        }
    } else {
        ctx.cancel.is_cancelled()
    }
}

/// Uniform distribution over `[round_begin_time, round_begin_time + 4*lambda]`,
/// recorded as an Open Question resolution in `DESIGN.md`.
fn pick_biased_time(round_begin_time: Timestamp, tick_duration: Duration) -> Timestamp {
    let window_ms =
        (tick_duration.as_millis() as i64) * i64::from(ROUND_BEGIN_JITTER_TICKS);
    if window_ms <= 0 {
        return round_begin_time;
    }
    let offset = rand::thread_rng().gen_range(0..=window_ms);
    round_begin_time + offset
}

enum RoundOutcome {
    Cancelled,
    RoundOver,
    AgreementFailed(Error),
}

#[allow(clippy::too_many_arguments)]
async fn run_round_execution(
    ctx: &ChainDriverCtx,
    current_round: u64,
    round_begin_time: Timestamp,
    round_end_time: Timestamp,
    tick_duration: Duration,
    ticker: &mut dyn Ticker,
) -> RoundOutcome {
    // Step 1: biased round-begin sleep.
    let threshold = pick_biased_time(round_begin_time, tick_duration);
    if now_ms() < threshold {
        if sleep_until_cancellable(ctx, round_begin_time).await {
            return RoundOutcome::Cancelled;
        }
        // Two ticker drains to absorb pulses queued during the sleep
        // (hard-coded at 2, see `DESIGN.md`).
        for _ in 0..POST_JITTER_TICKER_DRAINS {
            ticker.tick().await;
        }
    }

    // Step 2: publish the current round, kick off the restart machinery.
    {
        let channel = ctx.instance.restart_channel.lock().await;
        channel.set_round(current_round);
        channel.push_initial_kick(Position::stop(current_round));
    }

    // Step 3: fresh vote filter for this chain.
    {
        let mut filter = ctx.filter_slot.lock().await;
        *filter = VoteFilter::new();
    }

    // Step 4: one-round sub-loop.
    match run_one_round(ctx, current_round, round_end_time, ticker).await {
        Ok(SubLoopExit::RoundOver) => RoundOutcome::RoundOver,
        Ok(SubLoopExit::Cancelled) => RoundOutcome::Cancelled,
        Err(e) => RoundOutcome::AgreementFailed(e),
    }
}

enum SubLoopExit {
    RoundOver,
    Cancelled,
}

/// `baRoutineForOneRound`: keep driving the BA's clocked
/// state machine until confirmation, then wait for a restart trigger at the
/// next height, until the round's lattice tip has moved past this round.
async fn run_one_round(
    ctx: &ChainDriverCtx,
    current_round: u64,
    _round_end_time: Timestamp,
    ticker: &mut dyn Ticker,
) -> Result<SubLoopExit, Error> {
    let mut old_pos = ctx.instance.inner.lock().await.agreement_id();

    loop {
        if ctx.cancel.is_cancelled() {
            return Ok(SubLoopExit::Cancelled);
        }

        let confirmed = ctx.instance.inner.lock().await.confirmed();
        if confirmed {
            // Block on restart_notary until either a restart position
            // arrives or cancellation.
            let restart_pos = {
                let mut channel = ctx.instance.restart_channel.lock().await;
                tokio::select! {
                    pos = channel.recv() => pos,
                    _ = ctx.cancel.cancelled() => None,
                }
            };
            let Some(restart_pos) = restart_pos else {
                return Ok(SubLoopExit::Cancelled);
            };
            match handle_restart(ctx, current_round, &mut old_pos, restart_pos, ticker)
                .await?
            {
                RestartOutcome::BreakOuter => return Ok(SubLoopExit::RoundOver),
                RestartOutcome::Ignored | RestartOutcome::Restarted => continue,
            }
        } else {
            // Non-blockingly poll restart_notary.
            let restart_pos = {
                let mut channel = ctx.instance.restart_channel.lock().await;
                channel.try_recv()
            };
            if let Some(restart_pos) = restart_pos {
                match handle_restart(
                    ctx,
                    current_round,
                    &mut old_pos,
                    restart_pos,
                    ticker,
                )
                .await?
                {
                    RestartOutcome::BreakOuter => return Ok(SubLoopExit::RoundOver),
                    RestartOutcome::Ignored | RestartOutcome::Restarted => {}
                }
            }
        }

        if ctx.instance.inner.lock().await.pull_votes() {
            let position = ctx.instance.inner.lock().await.agreement_id();
            ctx.services.network.pull_votes(position).await;
        }

        {
            let mut inner = ctx.instance.inner.lock().await;
            if let Err(e) = inner.next_state() {
                return Err(e);
            }
        }

        // Drain `clocks()` ticks, breaking out as soon as `done()` fires
        // (priority select: check first, no wait).
        let clocks = ctx.instance.inner.lock().await.clocks();
        let notify = ctx.instance.inner.lock().await.notify_done();
        for _ in 0..clocks {
            if ctx.instance.inner.lock().await.confirmed() {
                break;
            }
            tokio::select! {
                biased;
                _ = notify.notified() => break,
                _ = ticker.tick() => {}
                _ = ctx.cancel.cancelled() => return Ok(SubLoopExit::Cancelled),
            }
        }
    }
}

enum RestartOutcome {
    BreakOuter,
    Ignored,
    Restarted,
}

async fn handle_restart(
    ctx: &ChainDriverCtx,
    current_round: u64,
    old_pos: &mut Position,
    restart_pos: Position,
    ticker: &mut dyn Ticker,
) -> Result<RestartOutcome, Error> {
    if !restart_pos.is_stop() {
        if restart_pos.round > old_pos.round {
            // The round is over on this chain's side: wait for the
            // lattice's tip to reach or exceed it.
            loop {
                if ctx.cancel.is_cancelled() {
                    return Ok(RestartOutcome::BreakOuter);
                }
                if ctx.services.lattice.tip_round(ctx.chain_id).await
                    >= restart_pos.round
                {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(LATTICE_POLL_INTERVAL) => {}
                    _ = ctx.cancel.cancelled() => return Ok(RestartOutcome::BreakOuter),
                }
            }
            return Ok(RestartOutcome::BreakOuter);
        }
        if restart_pos < *old_pos {
            // A late BlockConfirmed event for an already-superseded block.
            trace!(
                chain_id = ctx.chain_id,
                ?restart_pos,
                ?old_pos,
                "ignoring stale restart position"
            );
            return Ok(RestartOutcome::Ignored);
        }
    }

    let (mut next_height, mut next_time) = match ctx
        .services
        .lattice
        .next_block(current_round, ctx.chain_id)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            warn!(
                chain_id = ctx.chain_id,
                error = %e,
                "lattice.next_block failed; falling back to restart position height"
            );
            (restart_pos.height, now_ms())
        }
    };

    loop {
        if next_height > restart_pos.height {
            break;
        }
        if old_pos.is_stop() && restart_pos.is_stop() && next_height == 0 {
            break;
        }
        if ctx.cancel.is_cancelled() {
            return Ok(RestartOutcome::BreakOuter);
        }
        tokio::select! {
            _ = tokio::time::sleep(LATTICE_POLL_INTERVAL) => {}
            _ = ctx.cancel.cancelled() => return Ok(RestartOutcome::BreakOuter),
        }
        match ctx
            .services
            .lattice
            .next_block(current_round, ctx.chain_id)
            .await
        {
            Ok((h, t)) => {
                next_height = h;
                next_time = t;
            }
            Err(_) => next_height = restart_pos.height,
        }
    }

    let next_pos = Position::new(
        ctx.instance.receiver.round(),
        ctx.chain_id,
        next_height,
    );
    *old_pos = next_pos;

    let leader = ctx
        .services
        .node_set_cache
        .leader_node(next_pos)
        .await
        .unwrap_or_else(|e| {
            crate::error::fatal::node_set_cache_corrupt(
                next_pos.round,
                ctx.chain_id,
                &e.0,
            )
        });

    if sleep_until_cancellable(ctx, next_time).await {
        return Ok(RestartOutcome::BreakOuter);
    }
    ticker.restart();

    let crs = crs_for_restart(ctx, next_pos.round).await;
    let notary_set = ctx
        .services
        .node_set_cache
        .notary_set(
            next_pos.round,
            ctx.chain_id,
            crs,
            current_notary_set_size(ctx, next_pos.round).await,
        )
        .await
        .unwrap_or_else(|e| {
            crate::error::fatal::node_set_cache_corrupt(
                next_pos.round,
                ctx.chain_id,
                &e.0,
            )
        });

    ctx.instance
        .inner
        .lock()
        .await
        .restart(notary_set, next_pos, leader, crs);

    Ok(RestartOutcome::Restarted)
}

async fn crs_for_restart(ctx: &ChainDriverCtx, round: u64) -> crate::types::Crs {
    ctx.configs
        .get_crs(round)
        .await
        .unwrap_or_else(|| crate::error::fatal::governance_missing(round))
}

async fn current_notary_set_size(ctx: &ChainDriverCtx, round: u64) -> usize {
    ctx.configs
        .get_config(round)
        .await
        .map(|c| c.notary_set_size)
        .unwrap_or_else(|| crate::error::fatal::governance_missing(round))
}
