//! Append-only ticket log, one JSON object per line.
//!
//! Every append is written and `fsync`ed before it returns. Appends from all
//! sessions are serialized behind one async mutex, which also guards the set
//! of ids already on disk so a retried append never writes twice.
//!
//! A record always starts on a fresh line. If the file ends in a torn record
//! (a crash mid-write), the next append terminates it first, and a failed
//! write is truncated back so it cannot tear the next one.

use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use supportdesk_core::error::TicketLogError;
use supportdesk_core::ticket::{Ticket, TicketId};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct TicketLog {
    path: PathBuf,
    written: Mutex<HashSet<TicketId>>,
}

impl TicketLog {
    /// Open the log at `path`. A missing file is created on first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TicketLogError> {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_err(&path, e)),
        };
        let written: HashSet<TicketId> = parse_tickets(&content).into_iter().map(|t| t.id).collect();
        debug!(path = %path.display(), tickets = written.len(), "Ticket log opened");
        Ok(Self {
            path,
            written: Mutex::new(written),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append `ticket`. Appending an id that is already logged is a
    /// no-op that returns the same id.
    pub async fn append(&self, ticket: &Ticket) -> Result<TicketId, TicketLogError> {
        let mut written = self.written.lock().await;
        if written.contains(&ticket.id) {
            debug!(ticket_id = %ticket.id, "Ticket already logged");
            return Ok(ticket.id.clone());
        }

        let mut line = serde_json::to_string(ticket)
            .map_err(|e| TicketLogError::Serialization(e.to_string()))?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_err(e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;

        let len = file.metadata().await.map_err(|e| self.io_err(e))?.len();
        if len > 0 && !ends_with_newline(&mut file).await.map_err(|e| self.io_err(e))? {
            warn!(path = %self.path.display(), "Ticket log ends in a torn record, starting a new line");
            line.insert(0, '\n');
        }

        let write = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await
        };
        let result = write.await;
        if let Err(e) = result {
            if let Err(truncate) = file.set_len(len).await {
                warn!(path = %self.path.display(), error = %truncate, "Failed to roll back partial ticket write");
            }
            return Err(self.io_err(e));
        }

        written.insert(ticket.id.clone());
        info!(
            ticket_id = %ticket.id,
            severity = %ticket.severity,
            session_id = %ticket.session_id,
            "Ticket logged"
        );
        Ok(ticket.id.clone())
    }

    /// All tickets on disk, oldest first. Corrupt lines are skipped.
    pub async fn list(&self) -> Result<Vec<Ticket>, TicketLogError> {
        let _guard = self.written.lock().await;
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(parse_tickets(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn io_err(&self, e: std::io::Error) -> TicketLogError {
        io_err(&self.path, e)
    }
}

fn io_err(path: &Path, e: std::io::Error) -> TicketLogError {
    TicketLogError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

async fn ends_with_newline(file: &mut tokio::fs::File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1)).await?;
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

fn parse_tickets(content: &str) -> Vec<Ticket> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match serde_json::from_str::<Ticket>(line) {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                warn!(line = i + 1, error = %e, "Skipping corrupted ticket record");
                None
            }
        })
        .collect()
}
