// src/source.rs
//! Line sources feeding the ingest pipeline

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::{io, path::Path, time::Duration};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Produces newline-framed text lines, one at a time.
///
/// `None` means end of input. An `Err` is a failed read of one line; the
/// source may still yield further lines afterwards.
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self) -> Option<io::Result<String>>;

    /// Human readable origin, for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: LineSource + ?Sized> LineSource for Box<T> {
    async fn next_line(&mut self) -> Option<io::Result<String>> {
        (**self).next_line().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Lines from any buffered async reader: a file, stdin, a socket
pub struct ReaderLineSource<R> {
    lines: Lines<R>,
    name: String,
}

impl<R: AsyncBufRead + Unpin + Send> ReaderLineSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            name: name.into(),
        }
    }
}

pub type FileLineSource = ReaderLineSource<BufReader<tokio::fs::File>>;
pub type StdinLineSource = ReaderLineSource<BufReader<tokio::io::Stdin>>;

impl FileLineSource {
    /// Replay a capture file of NMEA sentences
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| RelayError::Connection(format!("Failed to open {}: {}", path.display(), e)))?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

impl StdinLineSource {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for ReaderLineSource<R> {
    async fn next_line(&mut self) -> Option<io::Result<String>> {
        self.lines.next_line().await.transpose()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Lines read from the first serial device that could be opened
pub struct SerialLineSource {
    inner: ReaderLineSource<BufReader<SerialStream>>,
    device: String,
    baud_rate: u32,
}

impl SerialLineSource {
    /// Try each candidate device in order; the first one that opens wins.
    pub fn open(devices: &[String], baud_rate: u32, timeout: Duration) -> Result<Self> {
        if devices.is_empty() {
            return Err(RelayError::Config("no serial devices configured".to_string()));
        }

        for device in devices {
            match tokio_serial::new(device, baud_rate)
                .timeout(timeout)
                .open_native_async()
            {
                Ok(serial) => {
                    info!("Connected to GPS on {} at {} baud", device, baud_rate);
                    return Ok(Self {
                        inner: ReaderLineSource::new(BufReader::new(serial), device.clone()),
                        device: device.clone(),
                        baud_rate,
                    });
                }
                Err(e) => warn!("Error opening serial port {}: {}", device, e),
            }
        }

        Err(RelayError::Connection(format!(
            "Failed to open any serial port (tried {})",
            devices.join(", ")
        )))
    }
}

#[async_trait]
impl LineSource for SerialLineSource {
    async fn next_line(&mut self) -> Option<io::Result<String>> {
        self.inner.next_line().await
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.device, self.baud_rate)
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<()> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| RelayError::Other(format!("Failed to list serial ports: {}", e)))?;

    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {} - {:?}", port.port_name, port.port_type);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_source_yields_lines() {
        let input: &[u8] = b"$GPGLL,a\r\n$GPRMC,b\nlast";
        let mut source = ReaderLineSource::new(input, "memory");

        assert_eq!(source.next_line().await.unwrap().unwrap(), "$GPGLL,a");
        assert_eq!(source.next_line().await.unwrap().unwrap(), "$GPRMC,b");
        assert_eq!(source.next_line().await.unwrap().unwrap(), "last");
        assert!(source.next_line().await.is_none());
        assert_eq!(source.describe(), "memory");
    }

    #[tokio::test]
    async fn test_invalid_utf8_fails_one_line() {
        let input: &[u8] = b"first\n\xff\xfe\nthird\n";
        let mut source = ReaderLineSource::new(input, "memory");

        assert_eq!(source.next_line().await.unwrap().unwrap(), "first");
        let err = source.next_line().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(source.next_line().await.unwrap().unwrap(), "third");
        assert!(source.next_line().await.is_none());
    }

    #[tokio::test]
    async fn test_boxed_source() {
        let input: &[u8] = b"one\n";
        let mut source: Box<dyn LineSource> = Box::new(ReaderLineSource::new(input, "boxed"));
        assert_eq!(source.next_line().await.unwrap().unwrap(), "one");
        assert!(source.next_line().await.is_none());
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = FileLineSource::open_file("/nonexistent/capture.nmea").await;
        assert!(matches!(result, Err(RelayError::Connection(_))));
    }

    #[tokio::test]
    async fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.nmea");
        std::fs::write(&path, "$GPGLL,4916.45,N,12311.12,W,225444,A,*1D\n").unwrap();

        let mut source = FileLineSource::open_file(&path).await.unwrap();
        let line = source.next_line().await.unwrap().unwrap();
        assert!(line.starts_with("$GPGLL"));
        assert!(source.next_line().await.is_none());
    }

    #[tokio::test]
    async fn test_serial_fallback_exhausted() {
        let devices = vec![
            "/dev/gps-relay-missing-0".to_string(),
            "/dev/gps-relay-missing-1".to_string(),
        ];
        match SerialLineSource::open(&devices, 115200, Duration::from_millis(10)) {
            Err(RelayError::Connection(msg)) => {
                assert!(msg.contains("/dev/gps-relay-missing-0"));
                assert!(msg.contains("/dev/gps-relay-missing-1"));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("missing devices should not open"),
        }
    }

    #[tokio::test]
    async fn test_serial_no_devices() {
        let result = SerialLineSource::open(&[], 115200, Duration::from_millis(10));
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
