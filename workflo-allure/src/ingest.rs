// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reads event streams concurrently and feeds them to a single router.
//!
//! Every stream gets its own reader task. Events from one stream reach the router in the order
//! they were written; events from different streams interleave in arrival order.

use crate::errors::{ExpectedError, Result};
use camino::Utf8PathBuf;
use std::{fmt, str::FromStr};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc::{UnboundedSender, unbounded_channel},
};
use tracing::{debug, error, warn};
use workflo_reporter::{events::ReporterEvent, router::EventRouter};

/// A newline-delimited stream of reporter events.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum EventSource {
    Stdin,
    File(Utf8PathBuf),
}

impl FromStr for EventSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            Ok(Self::Stdin)
        } else {
            Ok(Self::File(s.into()))
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => write!(f, "<stdin>"),
            Self::File(path) => write!(f, "{path}"),
        }
    }
}

/// Counts gathered while ingesting streams.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct IngestSummary {
    pub(crate) handled: usize,
    pub(crate) malformed: usize,
}

enum StreamMessage {
    Event {
        source: usize,
        line: usize,
        event: Result<ReporterEvent, serde_json::Error>,
    },
    OpenFailed {
        path: Utf8PathBuf,
        error: std::io::Error,
    },
    ReadFailed {
        source: usize,
        line: usize,
        error: std::io::Error,
    },
}

/// Reads all sources to the end and routes their events.
///
/// Malformed lines are logged and skipped. A stream that cannot be opened or read does not stop
/// the other streams, but is reported once they are done. Failing to write a report stops
/// ingestion at once.
pub(crate) fn ingest(sources: &[EventSource], router: &mut EventRouter) -> Result<IngestSummary> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("workflo-allure-reader")
        .build()
        .map_err(|error| ExpectedError::TokioRuntimeCreate { error })?;

    if sources.len() > 1 {
        warn!(
            streams = sources.len(),
            "events from different streams are routed in arrival order, spec steps only see \
             failures that arrived before them",
        );
    }

    runtime.block_on(async {
        let (sender, mut receiver) = unbounded_channel();
        for (index, source) in sources.iter().enumerate() {
            tokio::spawn(read_source(index, source.clone(), sender.clone()));
        }
        // The loop below ends once every reader has dropped its sender.
        drop(sender);

        let mut summary = IngestSummary::default();
        let mut stream_error = None;
        while let Some(message) = receiver.recv().await {
            match message {
                StreamMessage::Event {
                    source,
                    line,
                    event: Ok(event),
                } => {
                    if let Err(err) = router.handle(event) {
                        error!(stream = %sources[source], line, "aborting: report could not be written");
                        return Err(ExpectedError::from(err));
                    }
                    summary.handled += 1;
                }
                StreamMessage::Event {
                    source,
                    line,
                    event: Err(error),
                } => {
                    error!(stream = %sources[source], line, "skipping malformed event: {error}");
                    summary.malformed += 1;
                }
                StreamMessage::OpenFailed { path, error } => {
                    stream_error.get_or_insert(ExpectedError::EventStreamOpen { path, error });
                }
                StreamMessage::ReadFailed {
                    source,
                    line,
                    error,
                } => {
                    stream_error.get_or_insert(ExpectedError::EventStreamRead {
                        stream: sources[source].to_string(),
                        line,
                        error,
                    });
                }
            }
        }

        match stream_error {
            Some(error) => Err(error),
            None => Ok(summary),
        }
    })
}

async fn read_source(index: usize, source: EventSource, sender: UnboundedSender<StreamMessage>) {
    match source {
        EventSource::Stdin => read_lines(index, tokio::io::stdin(), sender).await,
        EventSource::File(path) => match tokio::fs::File::open(&path).await {
            Ok(file) => read_lines(index, file, sender).await,
            Err(error) => {
                // A send only fails once the receiver is gone, and then nobody is listening.
                let _ = sender.send(StreamMessage::OpenFailed { path, error });
            }
        },
    }
}

async fn read_lines(
    index: usize,
    reader: impl AsyncRead + Unpin,
    sender: UnboundedSender<StreamMessage>,
) {
    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                let message = StreamMessage::Event {
                    source: index,
                    line: line_no,
                    event: ReporterEvent::from_json(&line),
                };
                if sender.send(message).is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!(source = index, lines = line_no, "event stream finished");
                return;
            }
            Err(error) => {
                let _ = sender.send(StreamMessage::ReadFailed {
                    source: index,
                    line: line_no,
                    error,
                });
                return;
            }
        }
    }
}
