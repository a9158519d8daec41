/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! A demand-driven, memoizing key/value computation engine.
//!
//! Computations are described as [`Key`]s. A key computes its value from the values of other
//! keys, requested through [`DiceComputations`]. Requesting a key that has not been computed
//! yet never blocks: the request is recorded and the computation returns
//! [`Suspend::NotReady`]. The scheduler computes the recorded keys and then invokes the
//! suspended computation again from scratch. Computed values are cached and reused until a
//! key they (transitively) depend on is changed.
//!
//! ```ignore
//! #[derive(Allocative, Clone, Debug, Display, PartialEq, Eq, Hash)]
//! struct Double(u32);
//!
//! impl Key for Double {
//!     type Value = u32;
//!
//!     fn compute(&self, ctx: &mut DiceComputations) -> Demand<u32> {
//!         let base = ctx.compute(&Base(self.0))?;
//!         Ok(base * 2)
//!     }
//!
//!     fn equality(x: &u32, y: &u32) -> bool {
//!         x == y
//!     }
//! }
//!
//! let dice = Dice::builder().build();
//! let mut updater = dice.updater();
//! updater.changed_to(vec![(Base(1), 21)]);
//! let ctx = updater.commit();
//! assert_eq!(42, ctx.compute(&Double(1))?);
//! ```

mod api;
mod cycles;
mod dice;
mod impls;

pub use crate::api::cancellation::CancellationHandle;
pub use crate::api::computations::DiceComputations;
pub use crate::api::computations::FetchObserver;
pub use crate::api::data::DiceData;
pub use crate::api::demand::Demand;
pub use crate::api::demand::Suspend;
pub use crate::api::error::DiceError;
pub use crate::api::key::InjectedKey;
pub use crate::api::key::Key;
pub use crate::dice::Dice;
pub use crate::dice::DiceBuilder;
pub use crate::dice::DiceTransaction;
pub use crate::dice::DiceTransactionUpdater;
pub use crate::dice::Evaluation;
pub use crate::impls::key::DiceKey;
