//! Lock acquisition that survives poisoning.
//!
//! Poisoned guards are recovered, logged and counted instead of propagating
//! the panic to every later caller.

use std::sync::{
    LockResult, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use metrics::counter;
use tracing::warn;

pub(crate) const METRIC_LOCK_POISON_RECOVERED: &str = "folio_views_lock_poison_recovered_total";

fn recover<G>(
    result: LockResult<G>,
    target: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned: PoisonError<G>| {
        warn!(
            target = "folio_views::cache::lock",
            op,
            target_module = target,
            lock_kind,
            "Recovered from poisoned lock; state may be stale"
        );
        counter!(METRIC_LOCK_POISON_RECOVERED, "lock_kind" => lock_kind).increment(1);
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), target, op, "rwlock.read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), target, op, "rwlock.write")
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), target, op, "mutex.lock")
}
