//! Reuse of [`ReaderIterator`] instances across streams.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::trace;

use crate::decoder::ReaderIterator;
use crate::options::Options;

/// Source of reusable iterators.
pub trait IteratorPool: Send + Sync {
    /// Takes an iterator from the pool, or builds one if none is free.
    fn get(&self) -> ReaderIterator;

    /// Hands an iterator back for reuse.
    fn put(&self, iter: ReaderIterator);
}

/// A bounded free list of iterators sharing one set of options.
#[derive(Debug)]
pub struct ReaderIteratorPool {
    opts: Options,
    capacity: usize,
    free: Mutex<Vec<ReaderIterator>>,
}

impl ReaderIteratorPool {
    pub fn new(opts: Options, capacity: usize) -> Self {
        Self {
            opts,
            capacity,
            free: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Number of idle iterators held.
    pub fn len(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes an iterator bound to `source`. It goes back to the pool when the
    /// returned guard is dropped.
    pub fn checkout(self: &Arc<Self>, source: impl Into<Bytes>) -> PooledIterator {
        let mut iter = self.get();
        iter.reset(source);
        PooledIterator {
            iter,
            pool: Arc::clone(self),
        }
    }
}

impl IteratorPool for ReaderIteratorPool {
    fn get(&self) -> ReaderIterator {
        // A poisoned lock only means another thread panicked mid push/pop;
        // fall back to a fresh iterator.
        let reused = self.free.lock().ok().and_then(|mut free| free.pop());
        match reused {
            Some(iter) => {
                trace!("reusing pooled iterator");
                iter
            }
            None => {
                trace!("allocating iterator");
                ReaderIterator::new(Bytes::new(), self.opts)
            }
        }
    }

    fn put(&self, mut iter: ReaderIterator) {
        iter.close();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.capacity {
                free.push(iter);
                return;
            }
        }
        trace!("pool full, dropping iterator");
    }
}

/// An iterator checked out of a [`ReaderIteratorPool`]. Closing or dropping
/// it returns the iterator to the pool.
#[derive(Debug)]
pub struct PooledIterator {
    iter: ReaderIterator,
    pool: Arc<ReaderIteratorPool>,
}

impl PooledIterator {
    /// Closes the iterator and hands it back to the pool.
    pub fn close(self) {
        drop(self);
    }
}

impl Deref for PooledIterator {
    type Target = ReaderIterator;

    fn deref(&self) -> &ReaderIterator {
        &self.iter
    }
}

impl DerefMut for PooledIterator {
    fn deref_mut(&mut self) -> &mut ReaderIterator {
        &mut self.iter
    }
}

impl Drop for PooledIterator {
    fn drop(&mut self) {
        let placeholder = ReaderIterator::new(Bytes::new(), self.pool.opts);
        self.pool.put(std::mem::replace(&mut self.iter, placeholder));
    }
}
