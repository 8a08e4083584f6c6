// src/pipeline.rs
//! Ingest pipeline: lines in, published fixes out

use crate::{
    error::{RelayError, Result},
    gps::{nmea, Position, Rejection},
    publish::FixSink,
    source::LineSource,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Consecutive read failures tolerated before giving up on a source
pub const DEFAULT_MAX_READ_ERRORS: u32 = 25;

/// A sentence that produced no fix, with the raw line it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RejectionEvent {
    pub reason: Rejection,
    pub raw: String,
    pub at: DateTime<Utc>,
}

/// What happened to a GPGLL line, reported to observers
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Published {
        position: Position,
        message: String,
        at: DateTime<Utc>,
    },
    Rejected(RejectionEvent),
}

/// Result of feeding one line through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Not a GPGLL sentence
    Ignored,
    Published(Position),
    /// Decoded, but the sink refused it
    PublishFailed(Position),
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub ignored: u64,
    pub published: u64,
    pub rejected: u64,
    pub read_errors: u64,
    pub publish_errors: u64,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines, {} ignored, {} published, {} rejected, {} read errors, {} publish errors",
            self.lines, self.ignored, self.published, self.rejected, self.read_errors, self.publish_errors
        )
    }
}

/// Reads lines from `source`, decodes GPGLL fixes and hands valid ones to `sink`.
///
/// Each line is handled on its own and fully before the next one is read,
/// so a sink that blocks also stalls ingestion.
pub struct Pipeline<S, K> {
    source: S,
    sink: K,
    events: Option<UnboundedSender<PipelineEvent>>,
    max_read_errors: u32,
    stats: IngestStats,
}

impl<S: LineSource, K: FixSink> Pipeline<S, K> {
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            events: None,
            max_read_errors: DEFAULT_MAX_READ_ERRORS,
            stats: IngestStats::default(),
        }
    }

    /// Report every publish and rejection on `events`
    pub fn with_events(mut self, events: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// `0` retries reads forever
    pub fn with_max_read_errors(mut self, max_read_errors: u32) -> Self {
        self.max_read_errors = max_read_errors;
        self
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Consume the source until it ends.
    ///
    /// Bad sentences and isolated read errors are skipped. Only a run of
    /// `max_read_errors` failed reads in a row ends ingestion early.
    pub async fn run(&mut self) -> Result<IngestStats> {
        info!(
            "Reading NMEA sentences from {}, publishing to {}",
            self.source.describe(),
            self.sink.describe()
        );

        let mut consecutive_errors = 0u32;

        while let Some(next) = self.source.next_line().await {
            match next {
                Ok(line) => {
                    consecutive_errors = 0;
                    self.stats.lines += 1;
                    self.process_line(&line).await;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.stats.read_errors += 1;
                    warn!("Error reading from {}: {}", self.source.describe(), e);

                    if self.max_read_errors > 0 && consecutive_errors >= self.max_read_errors {
                        return Err(RelayError::Connection(format!(
                            "{} consecutive read errors from {}, last: {}",
                            consecutive_errors,
                            self.source.describe(),
                            e
                        )));
                    }
                }
            }
        }

        info!("End of input from {} ({})", self.source.describe(), self.stats);
        Ok(self.stats)
    }

    /// Handle one raw line
    pub async fn process_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if !nmea::is_gpgll(line) {
            self.stats.ignored += 1;
            return LineOutcome::Ignored;
        }

        debug!("GPGLL: {}", line);

        match nmea::parse_gpgll(line) {
            Ok(position) => {
                debug!("{}", position);
                let message = position.to_message();

                match self.sink.publish(&message).await {
                    Ok(()) => {
                        self.stats.published += 1;
                        self.emit(PipelineEvent::Published {
                            position,
                            message,
                            at: Utc::now(),
                        });
                        LineOutcome::Published(position)
                    }
                    Err(e) => {
                        self.stats.publish_errors += 1;
                        warn!("Failed to publish {} to {}: {}", message, self.sink.describe(), e);
                        LineOutcome::PublishFailed(position)
                    }
                }
            }
            Err(reason) => {
                nmea::log_rejection(line, &reason);
                self.stats.rejected += 1;
                self.emit(PipelineEvent::Rejected(RejectionEvent {
                    reason: reason.clone(),
                    raw: line.to_string(),
                    at: Utc::now(),
                }));

                LineOutcome::Rejected(reason)
            }
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            // Observer went away; keep ingesting
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gps::FieldKind, source::ReaderLineSource};
    use async_trait::async_trait;
    use std::{collections::VecDeque, io};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    const VALID: &str = "$GPGLL,4916.45,N,12311.12,W,225444,A,*1D";
    const VOID: &str = "$GPGLL,4916.45,N,12311.12,W,225444,V,*1D";

    #[derive(Default)]
    struct MemorySink {
        messages: Vec<String>,
    }

    #[async_trait]
    impl FixSink for MemorySink {
        async fn publish(&mut self, message: &str) -> Result<()> {
            self.messages.push(message.to_string());
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    struct FailingSink;

    #[async_trait]
    impl FixSink for FailingSink {
        async fn publish(&mut self, _message: &str) -> Result<()> {
            Err(RelayError::Publish("closed".to_string()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    struct ScriptedSource {
        items: VecDeque<io::Result<String>>,
    }

    impl ScriptedSource {
        fn new(items: Vec<io::Result<String>>) -> Self {
            Self { items: items.into() }
        }
    }

    #[async_trait]
    impl LineSource for ScriptedSource {
        async fn next_line(&mut self) -> Option<io::Result<String>> {
            self.items.pop_front()
        }

        fn describe(&self) -> String {
            "script".to_string()
        }
    }

    fn read_error() -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::InvalidData, "framing"))
    }

    fn memory_source(text: &str) -> ReaderLineSource<&[u8]> {
        ReaderLineSource::new(text.as_bytes(), "memory")
    }

    fn drain(rx: &mut UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_valid_sentence_is_published() {
        let mut pipeline = Pipeline::new(memory_source(VALID), MemorySink::default());
        let stats = pipeline.run().await.unwrap();

        assert_eq!(stats.published, 1);
        let (_, sink) = pipeline.into_parts();
        assert_eq!(sink.messages, vec!["49.274167/-123.185333".to_string()]);
    }

    #[tokio::test]
    async fn test_void_fix_is_not_published() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline::new(memory_source(VOID), MemorySink::default()).with_events(tx);
        let stats = pipeline.run().await.unwrap();

        assert_eq!(stats.published, 0);
        assert_eq!(stats.rejected, 1);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            PipelineEvent::Rejected(event) => {
                assert!(matches!(event.reason, Rejection::VoidFix { .. }));
                assert_eq!(event.raw, VOID);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(pipeline.into_parts().1.messages.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_sentence_is_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline::new(memory_source("$GPGLL,garbage\n"), MemorySink::default()).with_events(tx);

        assert_eq!(
            pipeline.process_line("$GPGLL,garbage").await,
            LineOutcome::Rejected(Rejection::MalformedSentence { fields: 2 })
        );
        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [PipelineEvent::Rejected(RejectionEvent {
                reason: Rejection::MalformedSentence { .. },
                ..
            })]
        ));
    }

    #[tokio::test]
    async fn test_other_sentences_are_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\n\
                     $GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\n\
                     \n";
        let mut pipeline = Pipeline::new(memory_source(input), MemorySink::default()).with_events(tx);
        let stats = pipeline.run().await.unwrap();

        assert_eq!(stats.lines, 3);
        assert_eq!(stats.ignored, 3);
        assert_eq!(stats.rejected, 0);
        assert!(drain(&mut rx).is_empty());
        assert!(pipeline.into_parts().1.messages.is_empty());
    }

    #[tokio::test]
    async fn test_surrounding_whitespace_is_trimmed() {
        let mut pipeline = Pipeline::new(memory_source(""), MemorySink::default());
        let outcome = pipeline.process_line(&format!("  {}\r\n", VALID)).await;
        assert!(matches!(outcome, LineOutcome::Published(_)));
    }

    #[tokio::test]
    async fn test_decode_error_reports_field() {
        let mut pipeline = Pipeline::new(memory_source(""), MemorySink::default());
        let outcome = pipeline
            .process_line("$GPGLL,4916.45,N,1231x.12,W,225444,A,*1D")
            .await;
        match outcome {
            LineOutcome::Rejected(Rejection::CoordinateDecode { field, .. }) => {
                assert_eq!(field, FieldKind::Longitude)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_every_tenth_line_malformed() {
        let mut input = String::new();
        for i in 0..1000 {
            if i % 10 == 9 {
                input.push_str("$GPGLL,garbage\n");
            } else {
                input.push_str(VALID);
                input.push('\n');
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline::new(memory_source(&input), MemorySink::default()).with_events(tx);
        let stats = pipeline.run().await.unwrap();

        assert_eq!(stats.lines, 1000);
        assert_eq!(stats.published, 900);
        assert_eq!(stats.rejected, 100);

        let events = drain(&mut rx);
        let rejections = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Rejected(_)))
            .count();
        assert_eq!(rejections, 100);
        assert_eq!(events.len() - rejections, 900);
        assert_eq!(pipeline.into_parts().1.messages.len(), 900);
    }

    #[tokio::test]
    async fn test_read_errors_are_skipped() {
        let source = ScriptedSource::new(vec![
            read_error(),
            Ok(VALID.to_string()),
            read_error(),
            Ok(VALID.to_string()),
        ]);
        let mut pipeline = Pipeline::new(source, MemorySink::default()).with_max_read_errors(2);
        let stats = pipeline.run().await.unwrap();

        assert_eq!(stats.read_errors, 2);
        assert_eq!(stats.published, 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let bytes: Vec<u8> = [VALID.as_bytes(), b"\n$GPGLL,49\xff\xfe\n", VALID.as_bytes(), b"\n"].concat();
        let mut pipeline = Pipeline::new(ReaderLineSource::new(&bytes[..], "memory"), MemorySink::default());

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.read_errors, 1);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.rejected, 0);
    }

    #[tokio::test]
    async fn test_consecutive_read_errors_stop_the_run() {
        let source = ScriptedSource::new(vec![read_error(), read_error(), read_error(), Ok(VALID.to_string())]);
        let mut pipeline = Pipeline::new(source, MemorySink::default()).with_max_read_errors(3);

        let result = pipeline.run().await;
        assert!(matches!(result, Err(RelayError::Connection(_))));
        assert_eq!(pipeline.stats().published, 0);
    }

    #[tokio::test]
    async fn test_unlimited_read_errors() {
        let mut items: Vec<io::Result<String>> = (0..100).map(|_| read_error()).collect();
        items.push(Ok(VALID.to_string()));
        let mut pipeline = Pipeline::new(ScriptedSource::new(items), MemorySink::default()).with_max_read_errors(0);

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.read_errors, 100);
        assert_eq!(stats.published, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_stop_ingest() {
        let input = format!("{}\n{}\n", VALID, VALID);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline::new(memory_source(&input), FailingSink).with_events(tx);

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.publish_errors, 2);
        assert!(matches!(pipeline.process_line(VALID).await, LineOutcome::PublishFailed(_)));
        assert_eq!(stats.published, 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_observer_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut pipeline = Pipeline::new(memory_source(VOID), MemorySink::default()).with_events(tx);
        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.rejected, 1);
    }
}
