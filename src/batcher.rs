use std::mem;

use tracing::debug;

use crate::{document::Document, error::Result, store::DocumentStore};

/// Queue of assembled documents, submitted to the store in chunks.
///
/// A submit happens as soon as the queue holds `threshold` documents.
/// Submitting does not commit.
#[derive(Debug)]
pub struct WriteBatcher {
    queue: Vec<Document>,
    threshold: usize,
    flushes: usize,
    submitted: usize,
}

impl WriteBatcher {
    pub const DEFAULT_THRESHOLD: usize = 1000;

    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            queue: Vec::with_capacity(threshold.min(Self::DEFAULT_THRESHOLD)),
            threshold,
            flushes: 0,
            submitted: 0,
        }
    }

    pub fn push<S: DocumentStore>(
        &mut self,
        store: &S,
        doc: Document,
    ) -> Result<()> {
        self.queue.push(doc);
        if self.queue.len() >= self.threshold {
            self.flush(store)?;
        }
        Ok(())
    }

    /// Submit everything queued. Returns the number of documents submitted.
    pub fn flush<S: DocumentStore>(&mut self, store: &S) -> Result<usize> {
        if self.queue.is_empty() {
            return Ok(0);
        }
        let docs = mem::take(&mut self.queue);
        let count = docs.len();
        store.submit(docs)?;
        self.flushes += 1;
        self.submitted += count;
        debug!(count, flushes = self.flushes, "flushed write queue");
        Ok(count)
    }

    /// Drop queued documents without submitting them.
    pub fn discard(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Documents submitted over the batcher's lifetime.
    pub fn submitted(&self) -> usize {
        self.submitted
    }
}

impl Default for WriteBatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{EntityId, EntityKind},
        store::MemoryStore,
    };

    fn doc(n: usize) -> Document {
        Document::new(&EntityId::new(format!("d{n}")), EntityKind::File)
    }

    #[test]
    fn flushes_when_threshold_reached() {
        let store = MemoryStore::new();
        let mut batcher = WriteBatcher::new(3);

        batcher.push(&store, doc(0)).unwrap();
        batcher.push(&store, doc(1)).unwrap();
        assert_eq!(store.submissions(), 0);
        assert_eq!(batcher.pending(), 2);

        batcher.push(&store, doc(2)).unwrap();
        assert_eq!(store.submissions(), 1);
        assert_eq!(batcher.pending(), 0);
        assert_eq!(store.pending(), 3);
    }

    #[test]
    fn flush_does_not_commit() {
        let store = MemoryStore::new();
        let mut batcher = WriteBatcher::new(10);
        batcher.push(&store, doc(0)).unwrap();

        assert_eq!(batcher.flush(&store).unwrap(), 1);
        assert_eq!(store.commits(), 0);
        assert!(store.lookup(&"d0".into()).unwrap().is_none());
    }

    #[test]
    fn empty_flush_is_noop() {
        let store = MemoryStore::new();
        let mut batcher = WriteBatcher::default();
        assert_eq!(batcher.flush(&store).unwrap(), 0);
        assert_eq!(batcher.flushes(), 0);
        assert_eq!(store.submissions(), 0);
    }

    #[test]
    fn discard_drops_queue() {
        let store = MemoryStore::new();
        let mut batcher = WriteBatcher::new(10);
        batcher.push(&store, doc(0)).unwrap();
        batcher.push(&store, doc(1)).unwrap();

        assert_eq!(batcher.discard(), 2);
        assert_eq!(batcher.flush(&store).unwrap(), 0);
        assert_eq!(store.submissions(), 0);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        assert_eq!(WriteBatcher::new(0).threshold(), 1);
    }

    #[test]
    fn counts_across_flushes() {
        let store = MemoryStore::new();
        let mut batcher = WriteBatcher::new(2);
        for n in 0..5 {
            batcher.push(&store, doc(n)).unwrap();
        }
        batcher.flush(&store).unwrap();
        assert_eq!(batcher.flushes(), 3);
        assert_eq!(batcher.submitted(), 5);
        assert_eq!(store.submissions(), 3);
    }
}
