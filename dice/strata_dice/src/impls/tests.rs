/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use allocative::Allocative;
use assert_matches::assert_matches;
use derive_more::Display;
use strata_error::ErrorTag;

use crate::Demand;
use crate::Dice;
use crate::DiceComputations;
use crate::DiceError;
use crate::Evaluation;
use crate::FetchObserver;
use crate::InjectedKey;
use crate::Key;

#[derive(Default)]
struct Counter(AtomicUsize);

impl Counter {
    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Allocative, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display("Base({})", _0)]
struct Base(u32);

impl InjectedKey for Base {
    type Value = i64;

    fn equality(x: &i64, y: &i64) -> bool {
        x == y
    }
}

/// Sum of `Base(0)..=Base(n)`.
#[derive(Allocative, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display("Sum({})", _0)]
struct Sum(u32);

impl Key for Sum {
    type Value = i64;

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<i64> {
        if let Ok(counter) = ctx.global_data().get::<Counter>() {
            counter.0.fetch_add(1, Ordering::SeqCst);
        }
        let keys: Vec<Base> = (0..=self.0).map(Base).collect();
        Ok(ctx.compute_many(&keys)?.into_iter().sum())
    }

    fn equality(x: &i64, y: &i64) -> bool {
        x == y
    }
}

/// `Sum(n) + Sum(n - 1)`, computed through other computed keys.
#[derive(Allocative, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display("Nested({})", _0)]
struct Nested(u32);

impl Key for Nested {
    type Value = i64;

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<i64> {
        let a = ctx.compute(&Sum(self.0))?;
        let b = if self.0 > 0 {
            ctx.compute(&Sum(self.0 - 1))?
        } else {
            0
        };
        Ok(a + b)
    }

    fn equality(x: &i64, y: &i64) -> bool {
        x == y
    }
}

#[derive(Allocative, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display("Cyclic({})", _0)]
struct Cyclic(u32);

impl Key for Cyclic {
    type Value = ();

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<()> {
        ctx.compute(&Cyclic((self.0 + 1) % 3))
    }

    fn equality(_: &(), _: &()) -> bool {
        true
    }
}

/// Fails when the base value is negative.
#[derive(Allocative, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display("Checked({})", _0)]
struct Checked(u32);

impl Key for Checked {
    type Value = strata_error::Result<i64>;

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<Self::Value> {
        let v = ctx.compute(&Base(self.0))?;
        if v < 0 {
            Ok(Err(strata_error::strata_error!(
                ErrorTag::Analysis,
                "negative base {}",
                self.0
            )))
        } else {
            Ok(Ok(v))
        }
    }

    fn equality(x: &Self::Value, y: &Self::Value) -> bool {
        match (x, y) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        }
    }

    fn failure(value: &Self::Value) -> Option<&strata_error::Error> {
        value.as_ref().err()
    }
}

#[test]
fn test_compute_and_cache() -> anyhow::Result<()> {
    let mut builder = Dice::builder();
    builder.set(Counter::default());
    let dice = builder.threads(4).build();
    let mut updater = dice.updater();
    updater.changed_to((0..5).map(|i| (Base(i), i as i64)));
    let ctx = updater.commit();

    assert_eq!(10, ctx.compute(&Sum(4))?);
    assert_eq!(10 + 6, ctx.compute(&Nested(4))?);
    // Sum(4) was cached, only Sum(3) is new.
    assert_eq!(2, ctx.global_data().get::<Counter>()?.get());
    Ok(())
}

#[test]
fn test_wide_round_on_many_workers() -> anyhow::Result<()> {
    let mut builder = Dice::builder();
    builder.set(Counter::default());
    let dice = builder.threads(4).build();
    let mut updater = dice.updater();
    updater.changed_to((0..32).map(|i| (Base(i), i as i64)));
    let ctx = updater.commit();

    let keys: Vec<Sum> = (0..32).map(Sum).collect();
    let sums = ctx.compute_many(&keys)?;
    let expected: Vec<i64> = (0..32i64).map(|n| n * (n + 1) / 2).collect();
    assert_eq!(expected, sums);
    assert_eq!(32, ctx.global_data().get::<Counter>()?.get());
    Ok(())
}

#[test]
fn test_invalidation() -> anyhow::Result<()> {
    let mut builder = Dice::builder();
    builder.set(Counter::default());
    let dice = builder.build();
    let mut updater = dice.updater();
    updater.changed_to((0..3).map(|i| (Base(i), 1)));
    let ctx = updater.commit();
    assert_eq!(3, ctx.compute(&Sum(2))?);
    assert_eq!(2, ctx.compute(&Sum(1))?);

    // Same value: nothing is invalidated.
    let mut updater = ctx.updater();
    updater.changed_to([(Base(2), 1)]);
    let ctx = updater.commit();
    assert!(ctx.is_cached(&Sum(2)));

    let mut updater = ctx.updater();
    updater.changed_to([(Base(2), 10)]);
    let ctx = updater.commit();
    assert!(!ctx.is_cached(&Sum(2)));
    assert!(ctx.is_cached(&Sum(1)));
    assert_eq!(12, ctx.compute(&Sum(2))?);
    assert_eq!(3, ctx.global_data().get::<Counter>()?.get());

    let mut updater = ctx.updater();
    updater.changed([Sum(1)]);
    let ctx = updater.commit();
    assert!(!ctx.is_cached(&Sum(1)));
    assert!(ctx.is_cached(&Sum(2)));
    Ok(())
}

#[test]
fn test_try_compute_reports_missing() -> anyhow::Result<()> {
    let dice = Dice::builder().build();
    let mut updater = dice.updater();
    updater.changed_to((0..2).map(|i| (Base(i), 5)));
    let ctx = updater.commit();

    let missing = match ctx.try_compute(&Nested(1))? {
        Evaluation::NotReady { missing } => missing,
        Evaluation::Ready(_) => panic!("expected not ready"),
    };
    assert_eq!(1, missing.len());
    assert_eq!(Some(&Sum(1)), missing[0].downcast_ref::<Sum>());
    assert!(!ctx.is_cached(&Nested(1)));

    assert_matches!(ctx.try_compute(&Sum(1))?, Evaluation::Ready(10));
    assert_matches!(
        ctx.try_compute(&Nested(1))?,
        Evaluation::NotReady { missing } if missing.len() == 1
    );
    assert_matches!(ctx.try_compute(&Sum(0))?, Evaluation::Ready(5));
    assert_matches!(ctx.try_compute(&Nested(1))?, Evaluation::Ready(15));
    assert!(ctx.is_cached(&Nested(1)));
    Ok(())
}

#[test]
fn test_cycle() {
    let dice = Dice::builder().build();
    let ctx = dice.updater().commit();
    let e = ctx.compute(&Cyclic(0)).unwrap_err();
    assert_matches!(e, DiceError::Cycle(keys) if keys.len() == 3);
}

#[test]
fn test_missing_injected() {
    let dice = Dice::builder().build();
    let ctx = dice.updater().commit();
    let e = ctx.compute(&Sum(0)).unwrap_err();
    assert_matches!(e, DiceError::MissingInjected(k) if k.downcast_ref::<Base>() == Some(&Base(0)));
}

#[test]
fn test_keep_going() -> anyhow::Result<()> {
    let dice = Dice::builder().build();
    let mut updater = dice.updater();
    updater.changed_to([(Base(0), -1), (Base(1), 1)]);
    let ctx = updater.commit();
    let e = ctx.compute_many(&[Checked(0), Checked(1)]).unwrap_err();
    assert_matches!(
        e,
        DiceError::FailFast(k, _) if k.downcast_ref::<Checked>() == Some(&Checked(0))
    );

    let ctx = dice.updater().commit().with_keep_going(true);
    let values = ctx.compute_many(&[Checked(0), Checked(1)])?;
    assert!(values[0].is_err());
    assert_eq!(1, *values[1].as_ref().map_err(|e| anyhow::anyhow!("{}", e))?);
    Ok(())
}

#[test]
fn test_cancelled() {
    let dice = Dice::builder().build();
    let mut updater = dice.updater();
    updater.changed_to([(Base(0), 1)]);
    let ctx = updater.commit();
    ctx.cancellation_handle().cancel();
    assert_matches!(ctx.compute(&Sum(0)), Err(DiceError::Cancelled));
    assert_matches!(ctx.try_compute(&Sum(0)), Err(DiceError::Cancelled));
    assert!(!ctx.is_cached(&Sum(0)));
}

#[derive(Default)]
struct CountingObserver {
    pre: AtomicUsize,
    post: AtomicUsize,
}

impl FetchObserver for CountingObserver {
    fn pre_fetch(&self) {
        self.pre.fetch_add(1, Ordering::SeqCst);
    }

    fn post_fetch(&self) {
        self.post.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Allocative, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display("Observed")]
struct Observed;

impl Key for Observed {
    type Value = (usize, usize);

    fn compute(&self, ctx: &mut DiceComputations) -> Demand<(usize, usize)> {
        let observer = Arc::new(CountingObserver::default());
        ctx.set_fetch_observer(Some(observer.clone()));
        ctx.compute_many2(&[Base(0)], &[Sum(0)])?;
        ctx.set_fetch_observer(None);
        ctx.compute(&Base(0))?;
        Ok((
            observer.pre.load(Ordering::SeqCst),
            observer.post.load(Ordering::SeqCst),
        ))
    }

    fn equality(x: &(usize, usize), y: &(usize, usize)) -> bool {
        x == y
    }
}

#[test]
fn test_fetch_observer() -> anyhow::Result<()> {
    let dice = Dice::builder().build();
    let mut updater = dice.updater();
    updater.changed_to([(Base(0), 1)]);
    let ctx = updater.commit();
    assert_eq!((1, 1), ctx.compute(&Observed)?);
    Ok(())
}
