//! The end-to-end ingestion pipeline.
//!
//! Socket task and reconciliation are decoupled by one bounded queue: the
//! stream client pushes normalized ingress messages, a single consumer
//! drains them in arrival order, enriching log-only notifications before
//! dispatch. Slow downstream work (RPC enrichment, oracle lookups,
//! database writes) back-pressures the queue instead of risking a socket
//! timeout, and a stalled database can never make the process buffer
//! without bound.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gachadex_oracle::PriceOracle;
use gachadex_rpc::{IngressMessage, LogStreamClient, TransactionEnricher};

use crate::chain::ChainStateReader;
use crate::dispatcher::EventDispatcher;
use crate::error::IndexerError;
use crate::notify::Notifier;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the ingress queue between socket and consumer.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { queue_capacity: 512 }
    }
}

/// Wires stream → queue → enrichment → dispatch and runs to completion.
pub struct Pipeline<C, O, N> {
    stream: LogStreamClient,
    enricher: TransactionEnricher,
    dispatcher: EventDispatcher<C, O, N>,
    config: PipelineConfig,
}

impl<C, O, N> Pipeline<C, O, N>
where
    C: ChainStateReader + 'static,
    O: PriceOracle + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        stream: LogStreamClient,
        enricher: TransactionEnricher,
        dispatcher: EventDispatcher<C, O, N>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            stream,
            enricher,
            dispatcher,
            config,
        }
    }

    /// Run until the stream client gives up (reconnect exhaustion) or the
    /// process is shut down. Transactions are processed one at a time in
    /// the order the provider delivered them.
    pub async fn run(self) -> Result<(), IndexerError> {
        let (tx, mut rx) = mpsc::channel::<IngressMessage>(self.config.queue_capacity);

        let stream = self.stream;
        let stream_task = tokio::spawn(async move { stream.run(tx).await });
        info!(queue_capacity = self.config.queue_capacity, "ingestion pipeline started");

        while let Some(message) = rx.recv().await {
            match message {
                IngressMessage::Logs(notification) => {
                    if notification.failed {
                        debug!(
                            signature = %notification.signature,
                            "notification reports failed transaction; skipping enrichment"
                        );
                        continue;
                    }
                    match self.enricher.enrich(&notification.signature).await {
                        Ok(Some(tx)) => self.dispatcher.process(&tx).await,
                        Ok(None) => {} // not found; already logged
                        Err(e) => {
                            warn!(
                                signature = %notification.signature,
                                error = %e,
                                "enrichment failed; dropping transaction"
                            );
                        }
                    }
                }
                IngressMessage::Transaction(tx) => self.dispatcher.process(&tx).await,
            }
        }

        // The sender side only closes when the stream task has ended.
        match stream_task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(IndexerError::Other(format!("stream task panicked: {e}"))),
        }
    }
}
