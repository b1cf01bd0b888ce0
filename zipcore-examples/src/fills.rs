//! Joins a stream of orders with a stream of fills, both sorted by order id.
//!
//! An order may be filled several times, so the join keeps the current order
//! while fills for it keep arriving and only then moves on.

use nutype::nutype;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Notify;
use tracing::{info, warn};
use zipcore::{Acknowledgment, Batch, Observer, StreamError, ZipRules};

/// Identifier shared by an order and its fills.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Serialize,
    Deserialize
))]
pub struct OrderId(u64);

/// A submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// Instrument symbol.
    pub symbol: String,
    /// Requested quantity.
    pub quantity: u64,
}

/// A partial or complete execution of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// The order this fill executes.
    pub order_id: OrderId,
    /// Executed quantity.
    pub quantity: u64,
}

/// Merge-join rules pairing every fill with its order.
///
/// Orders advance when they are behind the current fill, fills advance
/// whenever they are at or behind the current order. Fills for unknown
/// orders are skipped.
pub fn order_fill_rules() -> ZipRules<Order, Fill> {
    ZipRules::infallible(
        |order: &Order, fill: &Fill| order.id == fill.order_id,
        |order, fill| order.id < fill.order_id,
        |order, fill| fill.order_id <= order.id,
    )
}

/// Execution summary for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Instrument symbol.
    pub symbol: String,
    /// Requested quantity.
    pub ordered: u64,
    /// Quantity filled so far.
    pub filled: u64,
}

impl Execution {
    /// `true` when fills exceed the ordered quantity.
    pub const fn is_overfilled(&self) -> bool {
        self.filled > self.ordered
    }
}

/// Downstream observer aggregating fills per order.
#[derive(Debug, Default)]
pub struct ExecutionLedger {
    executions: Mutex<BTreeMap<OrderId, Execution>>,
    outcome: Mutex<Option<Result<(), StreamError>>>,
    finished: Notify,
}

impl ExecutionLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every execution recorded so far.
    pub fn executions(&self) -> BTreeMap<OrderId, Execution> {
        self.executions.lock().clone()
    }

    /// Waits for the joined stream to end and returns how it ended.
    pub async fn finished(&self) -> Result<(), StreamError> {
        loop {
            let notified = self.finished.notified();
            if let Some(outcome) = self.outcome.lock().clone() {
                return outcome;
            }
            notified.await;
        }
    }

    fn settle(&self, outcome: Result<(), StreamError>) {
        *self.outcome.lock() = Some(outcome);
        self.finished.notify_waiters();
    }
}

impl Observer<(Order, Fill)> for ExecutionLedger {
    fn on_next(&self, batch: Batch<(Order, Fill)>) -> Acknowledgment {
        let mut executions = self.executions.lock();
        for (order, fill) in batch {
            let execution = executions.entry(order.id).or_insert_with(|| Execution {
                symbol: order.symbol.clone(),
                ordered: order.quantity,
                filled: 0,
            });
            execution.filled += fill.quantity;
            if execution.is_overfilled() {
                warn!(order = %order.id, filled = execution.filled, "order overfilled");
            }
        }
        Acknowledgment::CONTINUE
    }

    fn on_error(&self, cause: StreamError) {
        warn!(%cause, "order fill join failed");
        self.settle(Err(cause));
    }

    fn on_completed(&self) {
        info!(orders = self.executions.lock().len(), "order fill join completed");
        self.settle(Ok(()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use zipcore::testing::prelude::*;
    use zipcore::ControlledZip;
    use zipcore_memory::{ImmediateScheduler, IterSource};

    fn order(id: u64, quantity: u64) -> Order {
        Order {
            id: OrderId::new(id),
            symbol: format!("SYM{id}"),
            quantity,
        }
    }

    fn fill(order_id: u64, quantity: u64) -> Fill {
        Fill {
            order_id: OrderId::new(order_id),
            quantity,
        }
    }

    #[test]
    fn test_rules_pair_every_fill_with_its_order() {
        let orders = IterSource::new(vec![vec![order(1, 10), order(2, 5)], vec![order(4, 1)]]);
        let fills = IterSource::new(vec![
            vec![fill(1, 4), fill(1, 6)],
            vec![fill(3, 9), fill(4, 1)],
        ]);
        let zip = ControlledZip::<Order, Fill>::builder(
            Arc::new(orders),
            Arc::new(fills),
            Arc::new(ImmediateScheduler),
        )
        .rules(order_fill_rules())
        .build();
        let downstream = Arc::new(RecordingObserver::<(Order, Fill)>::new());

        let _subscription = zip.observe(downstream.clone()).unwrap();

        let pairs: Vec<(u64, u64)> = downstream
            .items()
            .into_iter()
            .map(|(o, f)| (o.id.into_inner(), f.quantity))
            .collect();
        assert_eq!(pairs, vec![(1, 4), (1, 6), (4, 1)]);
        assert_completed_once(&downstream);
    }

    #[tokio::test]
    async fn test_ledger_aggregates_and_reports_completion() {
        let ledger = ExecutionLedger::new();

        let _ = ledger.on_next(Batch::from(vec![
            (order(1, 10), fill(1, 4)),
            (order(1, 10), fill(1, 7)),
        ]));
        ledger.on_completed();

        assert!(ledger.finished().await.is_ok());
        let executions = ledger.executions();
        let execution = &executions[&OrderId::new(1)];
        assert_eq!(execution.filled, 11);
        assert!(execution.is_overfilled());
    }
}
