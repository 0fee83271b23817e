//! Event dispatch for enriched transactions.
//!
//! Gatekeeping happens here: a transaction that failed on-chain is never
//! decoded (its logs cannot be trusted), and one event's handler error
//! never blocks the remaining events of the same or later transactions.

use tracing::{debug, error, warn};

use gachadex_codec::decode_logs;
use gachadex_oracle::PriceOracle;
use gachadex_rpc::EnrichedTransaction;

use crate::chain::ChainStateReader;
use crate::notify::Notifier;
use crate::reconcile::Reconciler;

/// Decodes an enriched transaction's logs and routes each event.
pub struct EventDispatcher<C, O, N> {
    reconciler: Reconciler<C, O, N>,
}

impl<C, O, N> EventDispatcher<C, O, N>
where
    C: ChainStateReader,
    O: PriceOracle,
    N: Notifier,
{
    pub fn new(reconciler: Reconciler<C, O, N>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Reconciler<C, O, N> {
        &self.reconciler
    }

    /// Process every event of one transaction, in log order.
    pub async fn process(&self, tx: &EnrichedTransaction) {
        if tx.failed {
            warn!(signature = %tx.signature, "skipping failed transaction");
            return;
        }

        let records = decode_logs(&tx.log_messages, &tx.signature, tx.slot);
        if records.is_empty() {
            debug!(signature = %tx.signature, "no events in transaction");
            return;
        }

        for record in &records {
            let name = record.event.name();
            if let Err(e) = self.reconciler.apply(record).await {
                // Isolate the failure: log with event name + signature and
                // keep going so one bad event cannot wedge the stream.
                error!(
                    event = name,
                    signature = %tx.signature,
                    error = %e,
                    "event handler failed; continuing with remaining events"
                );
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
