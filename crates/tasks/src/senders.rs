//! Sender counting over a mailbox.
//!
//! Pages through the inbox, counting the senders of every message in unread
//! threads, and logs the top senders once the inbox is exhausted.

use async_trait::async_trait;
use longrun_execution::BatchTask;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Threads fetched per batch.
pub const PAGE_SIZE: usize = 500;

/// Senders listed in the final report.
pub const TOP_SENDERS: usize = 20;

/// A message as far as sender counting cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Raw `From` header
    pub from: String,
}

/// An inbox thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailThread {
    /// Whether the thread has unread messages
    #[serde(default)]
    pub unread: bool,
    /// Messages in the thread
    #[serde(default)]
    pub messages: Vec<MailMessage>,
}

/// Read access to an inbox, newest thread first.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Fetch up to `max` threads starting at offset `start`.
    async fn inbox_threads(&self, start: usize, max: usize) -> anyhow::Result<Vec<MailThread>>;
}

/// Mailbox loaded from a JSON array of threads.
#[derive(Debug, Clone, Default)]
pub struct JsonMailbox {
    threads: Vec<MailThread>,
}

impl JsonMailbox {
    /// Wrap threads already in memory.
    pub fn from_threads(threads: Vec<MailThread>) -> Self {
        Self { threads }
    }

    /// Load threads from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        let threads = serde_json::from_str(&json)?;
        Ok(Self { threads })
    }

    /// Number of threads in the mailbox.
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Whether the mailbox holds no thread.
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

#[async_trait]
impl Mailbox for JsonMailbox {
    async fn inbox_threads(&self, start: usize, max: usize) -> anyhow::Result<Vec<MailThread>> {
        Ok(self.threads.iter().skip(start).take(max).cloned().collect())
    }
}

/// State of a [`CountSendersTask`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendersState {
    /// Messages counted per sender
    pub senders: BTreeMap<String, u64>,
    /// Threads processed so far, also the offset of the next page
    pub count: usize,
}

/// Counts who sent the messages in unread inbox threads.
pub struct CountSendersTask<M: Mailbox> {
    mailbox: M,
    page_size: usize,
    max_threads: Option<usize>,
}

impl<M: Mailbox> CountSendersTask<M> {
    /// Create a task over `mailbox`, reading [`PAGE_SIZE`] threads per batch.
    pub fn new(mailbox: M) -> Self {
        Self {
            mailbox,
            page_size: PAGE_SIZE,
            max_threads: None,
        }
    }

    /// Set threads fetched per batch.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stop after this many threads even if the inbox has more.
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads);
        self
    }

    fn next_range(&self, processed: usize) -> usize {
        match self.max_threads {
            Some(max) => max.saturating_sub(processed).min(self.page_size),
            None => self.page_size,
        }
    }
}

#[async_trait]
impl<M: Mailbox> BatchTask for CountSendersTask<M> {
    type State = SendersState;

    fn name(&self) -> &str {
        "CountSendersTask"
    }

    fn initialise_state(&self) -> SendersState {
        SendersState::default()
    }

    async fn process_batch(&self, state: &mut SendersState) -> anyhow::Result<bool> {
        let range = self.next_range(state.count);
        if range == 0 {
            report(&state.senders);
            return Ok(true);
        }

        let threads = self.mailbox.inbox_threads(state.count, range).await?;
        if threads.is_empty() {
            report(&state.senders);
            return Ok(true);
        }

        for thread in threads.iter().filter(|t| t.unread) {
            for message in &thread.messages {
                *state.senders.entry(message.from.clone()).or_default() += 1;
            }
        }

        state.count += threads.len();
        info!("Processed {} threads", state.count);

        if self.next_range(state.count) == 0 {
            report(&state.senders);
            return Ok(true);
        }
        Ok(false)
    }
}

/// The `n` most frequent senders, most frequent first, ties by address.
pub fn top_senders(senders: &BTreeMap<String, u64>, n: usize) -> Vec<(&str, u64)> {
    let mut ranked: Vec<_> = senders.iter().map(|(s, c)| (s.as_str(), *c)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);
    ranked
}

fn report(senders: &BTreeMap<String, u64>) {
    info!("Total senders: {}", senders.len());
    info!("Top senders:");
    for (sender, count) in top_senders(senders, TOP_SENDERS) {
        info!("\t{}\t{}", count, sender);
    }
}
