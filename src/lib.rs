// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Byzantine Agreement manager: owns one BA instance per chain of a
//! sharded round, drives each through a cooperative per-chain task, and
//! routes votes, blocks and peer agreement results to the right instance.
//!
//! This crate ships no cryptography, no wire codec and no block execution —
//! those live behind the traits in [`external`]. An embedding node supplies
//! concrete implementations and wires them into a [`services::Services`]
//! bundle, constructs a [`manager::BaMgr`], and drives it with
//! [`manager::BaMgr::append_config`] as governance publishes new rounds.

pub mod config;
pub mod driver;
pub mod error;
pub mod external;
pub mod filter;
pub mod instance;
pub mod leader;
pub mod manager;
pub mod result_cache;
pub mod services;
pub mod types;

pub use error::{Error, Result};
pub use manager::BaMgr;
pub use services::Services;
