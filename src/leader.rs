// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Leader Validator: a predicate passed into each BA instance, composing
//! timestamp, lattice sanity and application verification checks, in that
//! order.

use crate::error::{Error, Result};
use crate::external::{Application, Lattice, LatticeError, VerifyResult};
use crate::types::{Block, Timestamp};
use std::sync::Arc;

pub struct LeaderValidator<L: Lattice, A: Application> {
    lattice: Arc<L>,
    application: Arc<A>,
}

impl<L: Lattice, A: Application> LeaderValidator<L, A> {
    pub fn new(lattice: Arc<L>, application: Arc<A>) -> Self {
        Self {
            lattice,
            application,
        }
    }

    /// `Ok(true)` — accept `block` as this position's leader candidate.
    /// `Ok(false)` — not valid *yet* (future timestamp, pending sanity
    /// check, or the application asked to retry later).
    /// `Err` — propagated hard failure.
    pub async fn valid_leader(
        &self,
        block: &Block,
        now: Timestamp,
    ) -> Result<bool> {
        if block.timestamp > now {
            return Ok(false);
        }

        match self.lattice.sanity_check(block, true).await {
            Ok(()) => {}
            Err(LatticeError::RetrySanityCheckLater) => return Ok(false),
            Err(e) => return Err(Error::Lattice(e.to_string())),
        }

        match self.application.verify_block(block).await {
            VerifyResult::Invalid => {
                Err(Error::InvalidBlock(
                    "application rejected the candidate block".into(),
                ))
            }
            VerifyResult::RetryLater => Ok(false),
            VerifyResult::Valid => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, Position};
    use async_trait::async_trait;

    struct MockLattice {
        sanity: Result<(), LatticeError>,
    }

    #[async_trait]
    impl Lattice for MockLattice {
        async fn sanity_check(
            &self,
            _block: &Block,
            _strict: bool,
        ) -> std::result::Result<(), LatticeError> {
            self.sanity
        }
        async fn next_block(
            &self,
            _round: u64,
            _chain_id: u32,
        ) -> std::result::Result<(u64, Timestamp), LatticeError> {
            Ok((0, 0))
        }
        async fn tip_round(&self, _chain_id: u32) -> u64 {
            0
        }
    }

    struct MockApplication {
        verdict: VerifyResult,
    }

    #[async_trait]
    impl Application for MockApplication {
        async fn verify_block(&self, _block: &Block) -> VerifyResult {
            self.verdict
        }
    }

    fn block(timestamp: Timestamp) -> Block {
        Block {
            hash: [0; 32],
            position: Position::new(1, 0, 1),
            proposer: NodeId::ZERO,
            timestamp,
            payload: vec![],
        }
    }

    #[tokio::test]
    async fn future_timestamp_is_not_valid_yet() {
        let validator = LeaderValidator::new(
            Arc::new(MockLattice { sanity: Ok(()) }),
            Arc::new(MockApplication {
                verdict: VerifyResult::Valid,
            }),
        );
        assert_eq!(
            validator.valid_leader(&block(100), 50).await.unwrap(),
            false
        );
    }

    #[tokio::test]
    async fn retry_sanity_check_is_not_valid_yet() {
        let validator = LeaderValidator::new(
            Arc::new(MockLattice {
                sanity: Err(LatticeError::RetrySanityCheckLater),
            }),
            Arc::new(MockApplication {
                verdict: VerifyResult::Valid,
            }),
        );
        assert_eq!(
            validator.valid_leader(&block(0), 50).await.unwrap(),
            false
        );
    }

    #[tokio::test]
    async fn other_sanity_error_propagates() {
        let validator = LeaderValidator::new(
            Arc::new(MockLattice {
                sanity: Err(LatticeError::Other),
            }),
            Arc::new(MockApplication {
                verdict: VerifyResult::Valid,
            }),
        );
        assert!(validator.valid_leader(&block(0), 50).await.is_err());
    }

    #[tokio::test]
    async fn application_invalid_is_an_error() {
        let validator = LeaderValidator::new(
            Arc::new(MockLattice { sanity: Ok(()) }),
            Arc::new(MockApplication {
                verdict: VerifyResult::Invalid,
            }),
        );
        assert!(validator.valid_leader(&block(0), 50).await.is_err());
    }

    #[tokio::test]
    async fn application_retry_later_is_not_valid_yet() {
        let validator = LeaderValidator::new(
            Arc::new(MockLattice { sanity: Ok(()) }),
            Arc::new(MockApplication {
                verdict: VerifyResult::RetryLater,
            }),
        );
        assert_eq!(
            validator.valid_leader(&block(0), 50).await.unwrap(),
            false
        );
    }

    #[tokio::test]
    async fn fully_valid_block_is_accepted() {
        let validator = LeaderValidator::new(
            Arc::new(MockLattice { sanity: Ok(()) }),
            Arc::new(MockApplication {
                verdict: VerifyResult::Valid,
            }),
        );
        assert_eq!(
            validator.valid_leader(&block(0), 50).await.unwrap(),
            true
        );
    }
}
