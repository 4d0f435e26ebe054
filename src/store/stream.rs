//! Query result stream
//!
//! Scan workers push [`ScanItem`]s into a bounded channel; the caller pulls
//! them through a [`QueryHandle`]. A full channel blocks the workers, so a
//! slow consumer holds memory at `channel_capacity` items. Dropping the
//! handle closes the channel and the workers stop at their next send.

use crate::aggregate::{Contribution, GroupKey};
use crate::store::error::StoreResult;
use crate::store::types::FlightRecord;
use futures_util::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Groups folded by one partition's worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialAggregate {
    pub partition: u32,
    pub groups: HashMap<GroupKey, Contribution>,
}

impl PartialAggregate {
    pub fn new(partition: u32) -> Self {
        Self {
            partition,
            groups: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// One element of a query result stream
#[derive(Debug, Clone)]
pub enum ScanItem {
    /// A matching record (no aggregate function requested)
    Record(Box<FlightRecord>),
    /// A partition's folded groups (aggregate function requested)
    Partial(PartialAggregate),
}

/// Sender half used by scan workers
pub type ScanSender = mpsc::Sender<StoreResult<ScanItem>>;

/// Pull-based, one-shot handle on a running query
#[derive(Debug)]
pub struct QueryHandle {
    rx: mpsc::Receiver<StoreResult<ScanItem>>,
}

impl QueryHandle {
    /// Create a bounded channel and the handle reading from it
    pub fn channel(capacity: usize) -> (ScanSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// Next item, `None` once every worker has finished
    pub async fn next_item(&mut self) -> Option<StoreResult<ScanItem>> {
        self.rx.recv().await
    }

    /// Abandon the query
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

impl Stream for QueryHandle {
    type Item = StoreResult<ScanItem>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::error::StoreError;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_stream_ends_when_senders_drop() {
        let (tx, mut handle) = QueryHandle::channel(4);
        tx.send(Ok(ScanItem::Partial(PartialAggregate::new(0))))
            .await
            .unwrap();
        drop(tx);

        assert!(matches!(handle.next().await, Some(Ok(ScanItem::Partial(_)))));
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_closes_channel() {
        let (tx, handle) = QueryHandle::channel(1);
        handle.cancel();
        let sent = tx
            .send(Err(StoreError::Lock("unused".to_string())))
            .await;
        assert!(sent.is_err());
    }
}
