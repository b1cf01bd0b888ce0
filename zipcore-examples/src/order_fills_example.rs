//! Order fills example
//!
//! Streams orders and fills from two independent producers on a tokio
//! runtime, joins them by order id, and prints the execution ledger.
//!
//! Run with `RUST_LOG=zipcore=debug` to watch the combinator's decisions.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zipcore::{BoxError, ControlledZip, OutputCapacity, ZipConfig, ZipName};
use zipcore_examples::fills::{order_fill_rules, ExecutionLedger, Fill, Order, OrderId};
use zipcore_memory::{IterSource, TokioScheduler};

const SYMBOLS: [&str; 4] = ["ACME", "GLOBEX", "INITECH", "UMBRELLA"];

fn orders() -> Vec<Order> {
    (1..=12u64)
        .zip(SYMBOLS.iter().cycle())
        .map(|(id, symbol)| Order {
            id: OrderId::new(id),
            symbol: (*symbol).to_string(),
            quantity: 100 * id,
        })
        .collect()
}

/// Every order but the multiples of five gets filled in up to three parts;
/// order 99 does not exist and its fill is skipped by the join.
fn fills() -> Vec<Fill> {
    let mut fills: Vec<Fill> = (1..=12u64)
        .filter(|id| id % 5 != 0)
        .flat_map(|id| {
            (0..id % 3 + 1).map(move |part| Fill {
                order_id: OrderId::new(id),
                quantity: 100 * id / (id % 3 + 1) + part,
            })
        })
        .collect();
    fills.push(Fill {
        order_id: OrderId::new(99),
        quantity: 1,
    });
    fills
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting order fills example");

    let scheduler = Arc::new(TokioScheduler::current()?);
    let config = ZipConfig::new()
        .with_name(ZipName::try_new("order-fills")?)
        .with_output_capacity(OutputCapacity::try_new(16)?);

    let zip = ControlledZip::<Order, Fill>::builder(
        Arc::new(IterSource::chunked(orders(), 5)),
        Arc::new(IterSource::chunked(fills(), 4)),
        scheduler,
    )
    .rules(order_fill_rules())
    .config(config)
    .build();

    let ledger = Arc::new(ExecutionLedger::new());
    let subscription = zip.observe(ledger.clone())?;
    ledger.finished().await?;
    subscription.cancel();

    for (id, execution) in ledger.executions() {
        println!(
            "order {id:>3} {:<9} ordered {:>5} filled {:>5}{}",
            execution.symbol,
            execution.ordered,
            execution.filled,
            if execution.is_overfilled() { "  (overfilled)" } else { "" }
        );
    }
    println!("{}", serde_json::to_string_pretty(&zip.metrics())?);
    Ok(())
}
