// Streaming JSON-lines export of a snapshot.
// A producer task serializes one record at a time into a single-slot channel, so at
// most one encoded line is in flight whatever the snapshot size. Dropping or closing
// the stream makes the producer's next send fail, which stops it.

use std::borrow::Cow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ExportError;
use crate::models::{AggregatedIndividual, AggregatedTuple, Role, Snapshot};
use crate::transform::reverse_query;

/// One line of the tuple export.
#[derive(Debug, Serialize)]
pub struct TupleLine<'a> {
    pub query: Cow<'a, str>,
    #[serde(rename = "type")]
    pub qtype: &'a str,
    pub answer: &'a str,
    pub ttl: &'a str,
    pub count: u64,
    pub first: u64,
    pub last: u64,
}

impl<'a> TupleLine<'a> {
    pub fn new(t: &'a AggregatedTuple, reverse: bool) -> Self {
        let query = if reverse {
            Cow::Owned(reverse_query(&t.key.query))
        } else {
            Cow::Borrowed(t.key.query.as_str())
        };
        Self {
            query,
            qtype: &t.key.qtype,
            answer: &t.key.answer,
            ttl: &t.stat.ttl,
            count: t.stat.count,
            first: t.stat.first as u64,
            last: t.stat.last as u64,
        }
    }
}

/// One line of the individual export. Only query values are reversed.
#[derive(Debug, Serialize)]
pub struct IndividualLine<'a> {
    pub value: Cow<'a, str>,
    pub which: Role,
    pub count: u64,
    pub first: u64,
    pub last: u64,
}

impl<'a> IndividualLine<'a> {
    pub fn new(i: &'a AggregatedIndividual, reverse: bool) -> Self {
        let value = if reverse && i.key.role == Role::Query {
            Cow::Owned(reverse_query(&i.key.value))
        } else {
            Cow::Borrowed(i.key.value.as_str())
        };
        Self {
            value,
            which: i.key.role,
            count: i.stat.count,
            first: i.stat.first as u64,
            last: i.stat.last as u64,
        }
    }
}

/// Lazily produced JSON lines (each ending in '\n'). A serialization failure is
/// delivered as the final item.
pub struct ExportStream {
    rx: mpsc::Receiver<Result<Bytes, ExportError>>,
    producer: JoinHandle<()>,
}

impl ExportStream {
    pub async fn next_line(&mut self) -> Option<Result<Bytes, ExportError>> {
        self.rx.recv().await
    }

    /// Stop reading early and wait for the producer to exit.
    pub async fn close(self) {
        let ExportStream { rx, producer } = self;
        drop(rx);
        let _ = producer.await;
    }

    /// Copy every line to `out`. Returns the number of lines written.
    pub async fn write_to<W: AsyncWrite + Unpin>(mut self, out: &mut W) -> Result<u64, ExportError> {
        let mut lines = 0;
        while let Some(line) = self.next_line().await {
            out.write_all(&line?).await?;
            lines += 1;
        }
        out.flush().await?;
        Ok(lines)
    }
}

impl Stream for ExportStream {
    type Item = Result<Bytes, ExportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Stream the snapshot's tuples. Must be called inside a tokio runtime.
pub fn tuple_lines(snapshot: Arc<Snapshot>, reverse: bool) -> ExportStream {
    spawn_export(snapshot, "tuples", |s| s.tuples.len(), move |s, idx| {
        serde_json::to_vec(&TupleLine::new(&s.tuples[idx], reverse))
    })
}

/// Stream the snapshot's individual values. Must be called inside a tokio runtime.
pub fn individual_lines(snapshot: Arc<Snapshot>, reverse: bool) -> ExportStream {
    spawn_export(snapshot, "individual", |s| s.individual.len(), move |s, idx| {
        serde_json::to_vec(&IndividualLine::new(&s.individual[idx], reverse))
    })
}

fn spawn_export<L, E>(snapshot: Arc<Snapshot>, kind: &'static str, len: L, encode: E) -> ExportStream
where
    L: Fn(&Snapshot) -> usize + Send + 'static,
    E: Fn(&Snapshot, usize) -> serde_json::Result<Vec<u8>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    let producer = tokio::spawn(async move {
        for idx in 0..len(&snapshot) {
            let item = encode(&snapshot, idx)
                .map(|mut line| {
                    line.push(b'\n');
                    Bytes::from(line)
                })
                .map_err(ExportError::from);
            let failed = item.is_err();
            if tx.send(item).await.is_err() {
                debug!(kind, sent = idx, "export consumer closed stream");
                return;
            }
            if failed {
                return;
            }
        }
    });
    ExportStream { rx, producer }
}
