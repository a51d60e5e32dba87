use crate::models::NormalizedTx;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub max_batch_size: usize,
    pub flush_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            flush_interval: Duration::from_secs(5),
            channel_capacity: 16,
        }
    }
}

/// Coalesces a stream of single transactions into closed batches.
///
/// A batch is emitted when `max_batch_size` items are buffered or
/// `flush_interval` has passed since the first buffered item. Closing the
/// input flushes what is left and closes the output; dropping the output
/// stops the stage.
pub fn debounce(input: mpsc::Receiver<NormalizedTx>, config: DebounceConfig) -> mpsc::Receiver<Vec<NormalizedTx>> {
    let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
    tokio::spawn(BatchManager::new(config, sender).run(input));
    receiver
}

struct BatchManager {
    buffer: Vec<NormalizedTx>,
    deadline: Option<Instant>,
    config: DebounceConfig,
    sender: mpsc::Sender<Vec<NormalizedTx>>,
}

impl BatchManager {
    fn new(config: DebounceConfig, sender: mpsc::Sender<Vec<NormalizedTx>>) -> Self {
        Self {
            buffer: Vec::with_capacity(config.max_batch_size),
            deadline: None,
            config,
            sender,
        }
    }

    fn push(&mut self, transaction: NormalizedTx) {
        if self.buffer.is_empty() {
            self.deadline = Some(Instant::now() + self.config.flush_interval);
        }
        self.buffer.push(transaction);
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.config.max_batch_size.max(1)
    }

    /// Returns `false` once nobody is listening any more.
    async fn flush(&mut self) -> bool {
        self.deadline = None;
        if self.buffer.is_empty() {
            return true;
        }

        let batch = std::mem::take(&mut self.buffer);
        let size = batch.len();
        match self.sender.send(batch).await {
            Ok(()) => {
                debug!("Flushed batch of {} transactions", size);
                true
            }
            Err(_) => false,
        }
    }

    async fn run(mut self, mut input: mpsc::Receiver<NormalizedTx>) {
        loop {
            let deadline = self.deadline;
            let open = tokio::select! {
                item = input.recv() => match item {
                    Some(transaction) => {
                        self.push(transaction);
                        if self.should_flush() { self.flush().await } else { true }
                    }
                    None => {
                        self.flush().await;
                        false
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush().await
                }
            };

            if !open {
                break;
            }
        }
    }
}
