//! Background reader for a running query.
//!
//! [`Query`] owns the transport once the prompt has been sent. It runs one
//! tokio task that reads raw output, decodes it, and forwards messages in
//! order through a bounded channel. The task tears the transport down exactly
//! once, whichever way the query ends.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::decoder::StreamDecoder;
use super::transport::Transport;
use crate::errors::{ClaudeCodeError, Result};
use crate::types::Message;

/// Capacity of the hand-off channel between the reader and the consumer.
///
/// A full channel stalls the reader, which stops draining the CLI's stdout.
pub const MESSAGE_CHANNEL_CAPACITY: usize = 8;

/// Why the reader loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderExit {
    /// The terminal item (result or error) was delivered.
    Terminal,
    /// The cancellation token fired.
    Cancelled,
    /// The consumer dropped its receiver.
    ReceiverDropped,
}

/// Handle to the reader task of one query.
pub struct Query {
    transport: Option<Box<dyn Transport>>,
    decoder: Option<StreamDecoder>,
    message_tx: Option<mpsc::Sender<Result<Message>>>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl Query {
    /// Create a query over a connected transport.
    ///
    /// Returns the query and the receiving end of its message channel.
    pub fn new(
        transport: Box<dyn Transport>,
        decoder: StreamDecoder,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Result<Message>>) {
        let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let query = Self {
            transport: Some(transport),
            decoder: Some(decoder),
            message_tx: Some(tx),
            cancel,
            reader: None,
        };
        (query, rx)
    }

    /// Spawn the reader task.
    pub fn start(&mut self) -> Result<()> {
        let (Some(transport), Some(decoder), Some(tx)) = (
            self.transport.take(),
            self.decoder.take(),
            self.message_tx.take(),
        ) else {
            return Err(ClaudeCodeError::internal("query already started"));
        };

        let cancel = self.cancel.clone();
        self.reader = Some(tokio::spawn(read_messages(transport, decoder, tx, cancel)));
        Ok(())
    }

    /// The token that stops this query.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the query and wait for teardown to finish.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(reader) = self.reader.take() {
            reader
                .await
                .map_err(|e| ClaudeCodeError::internal(format!("reader task failed: {}", e)))?;
        } else if let Some(mut transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }
}

impl Drop for Query {
    fn drop(&mut self) {
        // The reader observes the token and closes the transport itself.
        self.cancel.cancel();
    }
}

async fn read_messages(
    mut transport: Box<dyn Transport>,
    mut decoder: StreamDecoder,
    tx: mpsc::Sender<Result<Message>>,
    cancel: CancellationToken,
) {
    let exit = pump(transport.as_mut(), &mut decoder, &tx, &cancel).await;
    debug!(?exit, "reader loop finished");

    if let Err(e) = transport.close().await {
        warn!(error = %e, "failed to tear down CLI process");
    }
}

async fn pump(
    transport: &mut dyn Transport,
    decoder: &mut StreamDecoder,
    tx: &mpsc::Sender<Result<Message>>,
    cancel: &CancellationToken,
) -> ReaderExit {
    let Some(mut output) = transport.take_output() else {
        let err = ClaudeCodeError::internal("transport output already taken");
        return match forward(tx, cancel, Err(err)).await {
            Some(exit) => exit,
            None => ReaderExit::Terminal,
        };
    };

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReaderExit::Cancelled,
            chunk = output.next() => chunk,
        };

        let items = match chunk {
            Some(Ok(bytes)) => decoder.feed(&bytes),
            Some(Err(e)) => vec![Err(e)],
            None => {
                let mut items = decoder.finish();
                let premature = matches!(
                    items.last(),
                    Some(Err(ClaudeCodeError::PrematureClose { detail: None }))
                );
                if premature {
                    // The CLI may hold the process open after closing stdout.
                    let detail = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return ReaderExit::Cancelled,
                        detail = transport.exit_detail() => detail,
                    };
                    if let Some(last) = items.last_mut() {
                        *last = Err(ClaudeCodeError::premature_close(detail));
                    }
                }
                items
            }
        };

        for item in items {
            let terminal = match &item {
                Ok(message) => message.is_result(),
                Err(_) => true,
            };
            if let Some(exit) = forward(tx, cancel, item).await {
                return exit;
            }
            if terminal {
                return ReaderExit::Terminal;
            }
        }
    }
}

/// Send one item, giving up if the query is cancelled or the consumer left.
async fn forward(
    tx: &mpsc::Sender<Result<Message>>,
    cancel: &CancellationToken,
    item: Result<Message>,
) -> Option<ReaderExit> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Some(ReaderExit::Cancelled),
        sent = tx.send(item) => match sent {
            Ok(()) => None,
            Err(_) => Some(ReaderExit::ReceiverDropped),
        },
    }
}
