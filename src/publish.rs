// src/publish.rs
//! Fix sinks: where accepted fixes are sent

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

/// Fixes a slow subscriber may fall behind by before it starts skipping
const CHANNEL_CAPACITY: usize = 256;

/// Default publish address, all interfaces
pub const DEFAULT_BIND: &str = "0.0.0.0:11205";

/// Receives one encoded message per accepted fix
#[async_trait]
pub trait FixSink: Send {
    async fn publish(&mut self, message: &str) -> Result<()>;

    /// Human readable destination, for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: FixSink + ?Sized> FixSink for Box<T> {
    async fn publish(&mut self, message: &str) -> Result<()> {
        (**self).publish(message).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Fan-out publisher: every connected TCP subscriber gets every message as
/// one newline-terminated line. Messages published while nobody is
/// connected are dropped.
pub struct TcpPublisher {
    tx: broadcast::Sender<Arc<str>>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl TcpPublisher {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to bind publisher on {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let accept_task = tokio::spawn(accept_subscribers(listener, tx.clone()));

        info!("Publishing fixes on tcp://{}", local_addr);

        Ok(Self {
            tx,
            local_addr,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of subscribers currently attached
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[async_trait]
impl FixSink for TcpPublisher {
    async fn publish(&mut self, message: &str) -> Result<()> {
        match self.tx.send(Arc::from(message)) {
            Ok(n) => debug!("Sent {} to {} subscriber(s)", message, n),
            Err(_) => debug!("No subscribers for {}", message),
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.local_addr)
    }
}

async fn accept_subscribers(listener: TcpListener, tx: broadcast::Sender<Arc<str>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("Subscriber connected: {}", peer);
                tokio::spawn(serve_subscriber(stream, peer, tx.subscribe()));
            }
            Err(e) => {
                warn!("Failed to accept subscriber: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_subscriber(mut stream: TcpStream, peer: SocketAddr, mut rx: broadcast::Receiver<Arc<str>>) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                let line = format!("{}\n", message);
                if let Err(e) = stream.write_all(line.as_bytes()).await {
                    info!("Subscriber {} disconnected: {}", peer, e);
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Subscriber {} fell behind, skipped {} fixes", peer, skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Prints each message on stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FixSink for ConsoleSink {
    async fn publish(&mut self, message: &str) -> Result<()> {
        println!("{}", message);
        Ok(())
    }

    fn describe(&self) -> String {
        "stdout".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::time::timeout;

    async fn wait_for_subscribers(publisher: &TcpPublisher, count: usize) {
        for _ in 0..200 {
            if publisher.subscriber_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("subscriber never attached");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let mut publisher = TcpPublisher::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish("1.000000/2.000000").await.unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_lines() {
        let mut publisher = TcpPublisher::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(publisher.local_addr()).await.unwrap();
        wait_for_subscribers(&publisher, 1).await;

        publisher.publish("49.274167/-123.185333").await.unwrap();
        publisher.publish("37.774900/-122.419400").await.unwrap();

        let mut lines = BufReader::new(stream).lines();
        let first = timeout(Duration::from_secs(5), lines.next_line()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(5), lines.next_line()).await.unwrap().unwrap();
        assert_eq!(first.as_deref(), Some("49.274167/-123.185333"));
        assert_eq!(second.as_deref(), Some("37.774900/-122.419400"));
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_each_fix() {
        let mut publisher = TcpPublisher::bind("127.0.0.1:0").await.unwrap();
        let a = TcpStream::connect(publisher.local_addr()).await.unwrap();
        let b = TcpStream::connect(publisher.local_addr()).await.unwrap();
        wait_for_subscribers(&publisher, 2).await;

        publisher.publish("0.000000/0.000000").await.unwrap();

        for stream in [a, b] {
            let mut lines = BufReader::new(stream).lines();
            let line = timeout(Duration::from_secs(5), lines.next_line()).await.unwrap().unwrap();
            assert_eq!(line.as_deref(), Some("0.000000/0.000000"));
        }
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let result = TcpPublisher::bind("not-an-address").await;
        assert!(matches!(result, Err(RelayError::Connection(_))));
    }

    #[test]
    fn test_describe() {
        assert_eq!(ConsoleSink::new().describe(), "stdout");
    }
}
