// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Bundles the external collaborators the manager and its drivers depend
//! on. A plain struct of trait objects, rather than threading six generic
//! parameters through `BaMgr`/`ChainDriverCtx`, keeps those signatures
//! readable: `dusk-consensus` generalizes over a single `Operations` trait
//! (`consensus.rs`'s `Consensus<T, D>`), but here there are six distinct
//! roles, so trait objects are the better fit (see `DESIGN.md`).

use crate::external::{
    AgreementFactory, Application, Governance, Lattice, Network, NodeSetCache,
    Signer, TickerFactory,
};
use crate::types::NodeId;
use std::sync::Arc;

pub struct Services {
    pub lattice: Arc<dyn Lattice>,
    pub application: Arc<dyn Application>,
    pub governance: Arc<dyn Governance>,
    pub node_set_cache: Arc<dyn NodeSetCache>,
    pub network: Arc<dyn Network>,
    pub ticker_factory: Arc<dyn TickerFactory>,
    pub agreement_factory: Arc<dyn AgreementFactory>,
    pub signer: Arc<dyn Signer>,
    /// This node's own identity, used to decide notary-set membership.
    pub node_id: NodeId,
}
