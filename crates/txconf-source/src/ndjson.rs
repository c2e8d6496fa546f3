use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{EventKind, SourceError, SourceResult};
use crate::event::{BlockEvent, ChaincodeEvent, EventFilter, RawBlockHeader};
use crate::traits::{BlockStream, ChaincodeStream, LedgerEventSource};

/// How long a following reader sleeps at end of file before polling again.
const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One line of the block file.
///
/// ```text
/// {"header":{"number":"100","data_hash":"ab..","previous_hash":"cd.."},"data":"<hex>"}
/// ```
#[derive(Deserialize)]
struct WireBlock {
    header: Option<RawBlockHeader>,
    #[serde(default)]
    data: String,
}

/// One line of the chaincode event file. `payload` may be a JSON object or
/// a string holding the raw payload text.
///
/// ```text
/// {"chaincode_name":"assets","event_name":"Create","block_number":100,"payload":{...}}
/// ```
#[derive(Deserialize)]
struct WireChaincode {
    chaincode_name: String,
    #[serde(default)]
    event_name: String,
    block_number: Value,
    payload: Value,
}

impl WireChaincode {
    fn into_event(self) -> Option<ChaincodeEvent> {
        let block_number = match &self.block_number {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let payload = match self.payload {
            Value::String(s) => s.into_bytes(),
            other => other.to_string().into_bytes(),
        };
        Some(ChaincodeEvent {
            chaincode_name: self.chaincode_name,
            event_name: self.event_name,
            block_number,
            payload,
        })
    }
}

fn parse_block_line(line: &str) -> BlockEvent {
    match serde_json::from_str::<WireBlock>(line) {
        Ok(wire) => BlockEvent {
            header: wire.header,
            data: hex::decode(wire.data.trim()).unwrap_or_else(|_| wire.data.into_bytes()),
        },
        Err(e) => {
            warn!(error = %e, "malformed block line");
            BlockEvent {
                header: None,
                data: line.as_bytes().to_vec(),
            }
        }
    }
}

fn parse_chaincode_line(line: &str) -> Option<ChaincodeEvent> {
    serde_json::from_str::<WireChaincode>(line)
        .ok()
        .and_then(WireChaincode::into_event)
}

/// Stand-in for an unparseable chaincode line. The empty payload makes the
/// listener count it as an extraction failure.
fn malformed_chaincode(chaincode_name: &str) -> ChaincodeEvent {
    warn!(chaincode = chaincode_name, "malformed chaincode line");
    ChaincodeEvent {
        chaincode_name: chaincode_name.to_string(),
        event_name: String::new(),
        block_number: 0,
        payload: Vec::new(),
    }
}

/// Ledger source that replays newline-delimited JSON event files.
///
/// Blocks and chaincode events live in two separate files, mirroring the two
/// independent subscriptions of a real ledger. In follow mode a reader waits
/// for more lines at end of file (like `tail -f`); otherwise the stream ends
/// at end of file. Empty lines are skipped.
#[derive(Clone, Debug)]
pub struct NdjsonEventSource {
    blocks_path: PathBuf,
    events_path: PathBuf,
    follow: bool,
    capacity: usize,
}

impl NdjsonEventSource {
    pub fn new(blocks_path: impl Into<PathBuf>, events_path: impl Into<PathBuf>) -> Self {
        Self {
            blocks_path: blocks_path.into(),
            events_path: events_path.into(),
            follow: false,
            capacity: 1024,
        }
    }

    /// Keep reading past end of file instead of ending the stream.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Channel capacity of each subscription.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    async fn open(path: &Path, kind: EventKind) -> SourceResult<BufReader<File>> {
        let file = File::open(path).await.map_err(|e| SourceError::Subscription {
            kind,
            reason: format!("cannot open {}: {e}", path.display()),
        })?;
        Ok(BufReader::new(file))
    }
}

/// Read complete lines from `reader` and forward the parsed items until the
/// receiver goes away, end of file is reached (when not following), or a
/// read error occurs.
async fn pump<T, F>(
    mut reader: BufReader<File>,
    follow: bool,
    sender: mpsc::Sender<T>,
    mut parse: F,
) where
    F: FnMut(&str) -> Option<T>,
{
    let mut buf = String::new();
    loop {
        match reader.read_line(&mut buf).await {
            Ok(0) => {
                if !follow || sender.is_closed() {
                    break;
                }
                tokio::time::sleep(FOLLOW_POLL_INTERVAL).await;
                continue;
            }
            Ok(_) if !buf.ends_with('\n') && follow => {
                // Partial line at end of file; wait for the writer to finish it.
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "event file read failed");
                break;
            }
        }

        let line = buf.trim();
        if !line.is_empty() {
            if let Some(item) = parse(line) {
                if sender.send(item).await.is_err() {
                    break;
                }
            }
        }
        buf.clear();
    }
    debug!("event file reader finished");
}

#[async_trait]
impl LedgerEventSource for NdjsonEventSource {
    async fn block_events(&self, after_block: Option<u64>) -> SourceResult<BlockStream> {
        let reader = Self::open(&self.blocks_path, EventKind::Block).await?;
        let (sender, receiver) = mpsc::channel(self.capacity);
        tokio::spawn(pump(reader, self.follow, sender, move |line| {
            let event = parse_block_line(line);
            match (after_block, event.number()) {
                (Some(after), Some(number)) if number <= after => None,
                _ => Some(event),
            }
        }));
        Ok(receiver)
    }

    async fn chaincode_events(&self, filter: EventFilter) -> SourceResult<ChaincodeStream> {
        let reader = Self::open(&self.events_path, EventKind::Chaincode).await?;
        let (sender, receiver) = mpsc::channel(self.capacity);
        tokio::spawn(pump(reader, self.follow, sender, move |line| {
            match parse_chaincode_line(line) {
                Some(event) => filter.matches(&event).then_some(event),
                // Has no position, so the resume filter does not apply.
                None => Some(malformed_chaincode(&filter.chaincode_name)),
            }
        }));
        Ok(receiver)
    }
}
