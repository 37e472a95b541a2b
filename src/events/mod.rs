use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the transaction core. Consumed asynchronously
/// by the audit logger; a consumer failure can never abort a business
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    TransactionCreated {
        transaction_id: Uuid,
        invoice_number: String,
        total_amount: i64,
    },
    TransactionCompleted {
        transaction_id: Uuid,
    },
    TransactionCanceled {
        transaction_id: Uuid,
        reason: String,
    },
    PaymentStatusChanged {
        transaction_id: Uuid,
        old_status: String,
        new_status: String,
    },
    GatewaySessionCreated {
        transaction_id: Uuid,
    },
    StockDecremented {
        product_id: Uuid,
        quantity: i32,
    },
    StockRestored {
        product_id: Uuid,
        quantity: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget emit: a full or closed channel is logged and
    /// swallowed so the emitting business path never fails on audit.
    pub async fn emit(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropped audit event");
        }
    }
}

/// Drains the event channel and writes each event to the structured log.
/// Runs until every sender is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::TransactionCreated {
                transaction_id,
                invoice_number,
                total_amount,
            } => {
                info!(%transaction_id, %invoice_number, total_amount, "audit: transaction created");
            }
            Event::TransactionCompleted { transaction_id } => {
                info!(%transaction_id, "audit: transaction completed");
            }
            Event::TransactionCanceled {
                transaction_id,
                reason,
            } => {
                info!(%transaction_id, reason, "audit: transaction canceled");
            }
            Event::PaymentStatusChanged {
                transaction_id,
                old_status,
                new_status,
            } => {
                info!(%transaction_id, old_status, new_status, "audit: payment status changed");
            }
            Event::GatewaySessionCreated { transaction_id } => {
                info!(%transaction_id, "audit: gateway session created");
            }
            Event::StockDecremented {
                product_id,
                quantity,
            } => {
                info!(%product_id, quantity, "audit: stock decremented");
            }
            Event::StockRestored {
                product_id,
                quantity,
            } => {
                info!(%product_id, quantity, "audit: stock restored");
            }
        }
    }
    info!("Event processor shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_swallows_send_failure_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic or error out of the emitting path.
        sender
            .emit(Event::TransactionCompleted {
                transaction_id: Uuid::new_v4(),
            })
            .await;
    }

    #[tokio::test]
    async fn events_flow_through_the_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .emit(Event::StockDecremented {
                product_id: Uuid::new_v4(),
                quantity: 2,
            })
            .await;
        assert!(matches!(
            rx.recv().await,
            Some(Event::StockDecremented { quantity: 2, .. })
        ));
    }
}
