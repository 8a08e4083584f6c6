// src/display/terminal.rs
//! Terminal status display

use super::RelayStatus;
use crate::{error::Result, pipeline::PipelineEvent};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

pub struct TerminalDisplay {
    refresh: Duration,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self {
            refresh: Duration::from_secs(1),
        }
    }

    /// Redraw the status until `running` is cleared or the pipeline goes away
    pub async fn run(
        &self,
        mut events: UnboundedReceiver<PipelineEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        let mut stdout = io::stdout();
        let mut status = RelayStatus::new();
        let mut ticker = tokio::time::interval(self.refresh);

        execute!(stdout, Hide, DisableLineWrap)?;

        while running.load(Ordering::Relaxed) {
            ticker.tick().await;

            let open = drain_events(&mut events, &mut status);

            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
            self.render_display(&mut stdout, &status)?;
            stdout.flush()?;

            if !open {
                break;
            }
        }

        execute!(stdout, Show, EnableLineWrap)?;
        println!("\nShutting down...");
        Ok(())
    }

    /// Render the relay status to the terminal
    fn render_display(&self, stdout: &mut impl Write, status: &RelayStatus) -> Result<()> {
        // Header
        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\n"),
            Print("GPS Relay - GPGLL fixes to subscribers"),
            Print("\n"),
            Print("=".repeat(60)),
            Print("\n"),
            ResetColor
        )?;

        let timestamp_str = match status.last_update {
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "No data received".to_string(),
        };
        execute!(
            stdout,
            Print(format!(
                "Last Update: {} (running since {})\n\n",
                timestamp_str,
                status.started.format("%H:%M:%S UTC")
            ))
        )?;

        self.render_position_section(stdout, status)?;
        self.render_counters_section(stdout, status)?;
        self.render_rejections_section(stdout, status)?;

        // Footer
        execute!(
            stdout,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\n"),
            Print("Press Ctrl+C to exit"),
            Print("\n"),
            ResetColor
        )?;

        Ok(())
    }

    fn render_position_section(&self, stdout: &mut impl Write, status: &RelayStatus) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Yellow),
            Print("POSITION:\n"),
            ResetColor
        )?;

        let position = status.last_position;
        execute!(
            stdout,
            Print(format!(
                "  Latitude:  {}\n",
                RelayStatus::format_coordinate(position.map(|p| p.latitude))
            )),
            Print(format!(
                "  Longitude: {}\n",
                RelayStatus::format_coordinate(position.map(|p| p.longitude))
            ))
        )?;

        if let Some(message) = &status.last_message {
            execute!(stdout, Print(format!("  Published: {:>24}\n", message)))?;
        }
        if let Some(age) = status.fix_age_seconds() {
            execute!(stdout, Print(format!("  Age:       {:>12} s\n", age)))?;
        }

        execute!(stdout, Print("\n"))?;
        Ok(())
    }

    fn render_counters_section(&self, stdout: &mut impl Write, status: &RelayStatus) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Cyan),
            Print("COUNTERS:\n"),
            ResetColor,
            Print(format!("  Published:  {:>10}\n", status.published)),
            Print(format!("  Void:       {:>10}\n", status.rejected_count("void"))),
            Print(format!("  Malformed:  {:>10}\n", status.rejected_count("malformed"))),
            Print(format!("  Bad coords: {:>10}\n\n", status.rejected_count("decode")))
        )?;

        Ok(())
    }

    fn render_rejections_section(&self, stdout: &mut impl Write, status: &RelayStatus) -> Result<()> {
        execute!(
            stdout,
            SetForegroundColor(Color::Magenta),
            Print("RECENT REJECTIONS:\n"),
            ResetColor
        )?;

        if status.recent_rejections.is_empty() {
            execute!(stdout, Print("  None\n\n"))?;
            return Ok(());
        }

        for rejection in status.recent_rejections.iter().rev() {
            execute!(
                stdout,
                Print(format!(
                    "  {} {}: {}\n",
                    rejection.at.format("%H:%M:%S"),
                    rejection.reason,
                    rejection.raw
                ))
            )?;
        }

        execute!(stdout, Print("\n"))?;
        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply every queued event; false once the sender side is gone
fn drain_events(events: &mut UnboundedReceiver<PipelineEvent>, status: &mut RelayStatus) -> bool {
    loop {
        match events.try_recv() {
            Ok(event) => status.apply(event),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}
