//! Per-task tracking of open transactions.
//!
//! A transaction belongs to the task that opened it. [`enter`] makes it the
//! task's current transaction on one scope while a future runs; statements
//! issued from that task find it through [`current`]. Other tasks sharing the
//! same scope never see it.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a transaction scope. Clones of a scope share the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone)]
struct Entered {
    scope: ScopeId,
    transaction: Arc<dyn Any + Send + Sync>,
}

tokio::task_local! {
    static ENTERED: Arc<[Entered]>;
}

/// Runs `future` with `transaction` as the task's current transaction on
/// `scope`. Transactions entered earlier on other scopes stay visible.
pub fn enter<T, F>(scope: ScopeId, transaction: Arc<T>, future: F) -> impl Future<Output = F::Output>
where
    T: Send + Sync + 'static,
    F: Future,
{
    let mut stack: Vec<Entered> = ENTERED
        .try_with(|entered| entered.to_vec())
        .unwrap_or_default();
    stack.push(Entered { scope, transaction });
    ENTERED.scope(stack.into(), future)
}

/// Returns the transaction the calling task entered on `scope`, if any.
pub fn current<T>(scope: ScopeId) -> Option<Arc<T>>
where
    T: Send + Sync + 'static,
{
    let transaction = ENTERED
        .try_with(|entered| {
            entered
                .iter()
                .rev()
                .find(|e| e.scope == scope)
                .map(|e| e.transaction.clone())
        })
        .ok()
        .flatten()?;
    transaction.downcast::<T>().ok()
}
