//! Length-limiting pass-through stage for publish streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::StreamExt;

use mqguard_core::{MqGuardError, Result};

use crate::broker::DataStream;

use super::quota::PublishTicket;

/// Counts bytes as chunks flow and aborts once the ceiling would be crossed.
///
/// Nothing is buffered. The chunk that would exceed the ceiling is never
/// forwarded; instead the stream yields one error and then ends. The same
/// error settles the publish ticket so the quota slot is released even if
/// the consumer never reports completion.
pub struct LengthLimited {
    inner: DataStream,
    limit: usize,
    seen: usize,
    topic: String,
    ticket: Option<PublishTicket>,
    failed: bool,
}

impl LengthLimited {
    pub fn new(inner: DataStream, limit: usize, topic: impl Into<String>) -> Self {
        Self {
            inner,
            limit,
            seen: 0,
            topic: topic.into(),
            ticket: None,
            failed: false,
        }
    }

    /// Also settle `ticket` when the ceiling is exceeded.
    pub fn with_ticket(mut self, ticket: PublishTicket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn bytes_forwarded(&self) -> usize {
        self.seen
    }

    fn overflow(&mut self) -> MqGuardError {
        self.failed = true;
        let err = MqGuardError::DataLimit(format!(
            "message data exceeded limit {}: {}",
            self.limit, self.topic
        ));
        tracing::info!(topic = %self.topic, limit = self.limit, "publish data over limit");
        if let Some(ticket) = &self.ticket {
            ticket.fail(err.clone());
        }
        err
    }
}

impl Stream for LengthLimited {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.failed {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let total = self.seen.saturating_add(chunk.len());
                if total > self.limit {
                    let err = self.overflow();
                    return Poll::Ready(Some(Err(err)));
                }
                self.seen = total;
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::stream;

    use super::*;
    use crate::policy::quota::QuotaState;

    fn chunks(sizes: &[usize]) -> DataStream {
        let items: Vec<Result<Bytes>> = sizes.iter().map(|n| Ok(Bytes::from(vec![0u8; *n]))).collect();
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn exact_limit_passes() {
        let mut s = LengthLimited::new(chunks(&[50, 50]), 100, "foo");
        let mut total = 0;
        while let Some(item) = s.next().await {
            total += item.unwrap().len();
        }
        assert_eq!(total, 100);
    }

    #[tokio::test]
    async fn overflow_chunk_is_not_forwarded() {
        let q = Arc::new(QuotaState::new());
        let ticket = q.try_admit(None).unwrap();
        let mut s = LengthLimited::new(chunks(&[50, 51, 10]), 100, "foo").with_ticket(ticket.clone());

        assert_eq!(s.next().await.unwrap().unwrap().len(), 50);
        let err = s.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "message data exceeded limit 100: foo");
        assert!(s.next().await.is_none());
        assert_eq!(s.bytes_forwarded(), 50);

        assert!(ticket.is_settled());
        assert_eq!(q.publications_in_flight(), 0);
    }

    #[tokio::test]
    async fn single_oversized_chunk_rejected() {
        let mut s = LengthLimited::new(chunks(&[101]), 100, "big");
        assert!(s.next().await.unwrap().is_err());
        assert_eq!(s.bytes_forwarded(), 0);
    }
}
