//! Transport boundary. The core only ever sees `Event`s in and `Response`s
//! out; this module defines the seam plus the line-oriented console adapter
//! the shipped binary uses. A chat adapter implements the same trait.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

use crate::workflow::{Event, Response};

pub const MENU_TEXT: &str = "Welcome to VPN Steward! Choose an action:\n\
                             ➕ /create — Create Client\n\
                             🗑️ /delete — Delete Client\n\
                             📋 /list — List Clients";

#[async_trait]
pub trait ChatTransport {
    /// Next inbound event, or `None` when the transport is closed.
    async fn next_event(&mut self) -> Option<(i64, Event)>;

    /// Deliver a response to the originating caller.
    async fn send(&mut self, caller_id: i64, response: Response) -> Result<()>;
}

/// Console adapter: reads `<caller_id> <command-or-text>` lines from stdin,
/// prints responses, and saves credential bundles next to the process.
pub struct ConsoleTransport {
    lines: Lines<BufReader<Stdin>>,
    bundle_dir: PathBuf,
}

impl ConsoleTransport {
    pub fn new(bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            bundle_dir: bundle_dir.into(),
        }
    }

    fn parse_line(line: &str) -> Option<(i64, Event)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (id_part, rest) = line.split_once(char::is_whitespace)?;
        let caller_id: i64 = id_part.parse().ok()?;

        let event = match rest.trim() {
            "/start" => Event::Start,
            "/create" => Event::Create,
            "/delete" => Event::Delete,
            "/list" => Event::List,
            text => Event::Text(text.to_string()),
        };
        Some((caller_id, event))
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn next_event(&mut self) -> Option<(i64, Event)> {
        loop {
            let line = self.lines.next_line().await.ok()??;
            match Self::parse_line(&line) {
                Some(parsed) => return Some(parsed),
                None => {
                    println!("Expected: <caller_id> </start|/create|/delete|/list|text>");
                }
            }
        }
    }

    async fn send(&mut self, caller_id: i64, response: Response) -> Result<()> {
        debug!(caller_id, "sending response");
        match response {
            Response::Text(text) => println!("[{caller_id}] {text}"),
            Response::Menu => println!("[{caller_id}] {MENU_TEXT}"),
            Response::Listing(listing) => println!("[{caller_id}] {listing}"),
            Response::Document { filename, bytes } => {
                let path = self.bundle_dir.join(&filename);
                tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("writing bundle to {}", path.display()))?;
                println!("[{caller_id}] 📎 Credential bundle saved to {}", path.display());
            }
        }
        Ok(())
    }
}
