use lru::LruCache;
use std::num::NonZeroUsize;

use crate::error::{Error, Result};

/// Bounded LRU cache of open segment handles, keyed by segment id.
///
/// Eviction hands the evicted entry back to the caller instead of dropping
/// it: the coordinator must close the underlying file synchronously and
/// surface any close error from the operation that triggered the eviction.
pub struct HandleCache<T> {
  inner: LruCache<u64, T>,
}

impl<T> HandleCache<T> {
  pub fn new(capacity: usize) -> Result<Self> {
    let capacity = NonZeroUsize::new(capacity)
      .ok_or_else(|| Error::Config("cache capacity must be greater than zero".into()))?;
    Ok(Self {
      inner: LruCache::new(capacity),
    })
  }

  /// Looks up `id`, marking the entry most-recently-used.
  /// `None` means not resident; it is never an error.
  pub fn get(&mut self, id: u64) -> Option<&mut T> {
    self.inner.get_mut(&id)
  }

  /// Inserts `value` under `id`. Returns the entry displaced to make room:
  /// the least-recently-used pair when capacity is exceeded, or the
  /// previous value under the same id.
  pub fn put(&mut self, id: u64, value: T) -> Option<(u64, T)> {
    self.inner.push(id, value)
  }

  /// Removes and returns the entry under `id`, transferring ownership back
  /// to the caller.
  pub fn pop(&mut self, id: u64) -> Option<T> {
    self.inner.pop(&id)
  }

  /// Pops the least-recently-used entry when the cache is at capacity, so a
  /// following `put` cannot evict. Lets callers close the displaced handle
  /// before they open a new one, keeping the open-descriptor bound intact.
  pub fn evict_if_full(&mut self) -> Option<(u64, T)> {
    if self.inner.len() == self.inner.cap().get() {
      self.inner.pop_lru()
    } else {
      None
    }
  }

  /// Invokes `f` over every resident entry exactly once, short-circuiting
  /// on the first failure. Visit order is unspecified.
  pub fn apply<F>(&mut self, mut f: F) -> Result<()>
  where
    F: FnMut(u64, &mut T) -> Result<()>,
  {
    for (k, v) in self.inner.iter_mut() {
      f(*k, v)?;
    }
    Ok(())
  }
}
