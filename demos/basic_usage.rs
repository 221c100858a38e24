// ============================================================================
// Basic Usage Example
// ============================================================================

use fx_reconcile::logging::init_logging;
use fx_reconcile::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = init_logging("fx_reconcile=info");
    println!("=== FX Reconcile Example ===\n");

    // Rates between 0.0001 and 10 pass, answers take 300 ms
    let gateway = DelayedGateway::new(
        BoundsGateway::new(Decimal::new(1, 4), Decimal::new(10, 0)),
        Duration::from_millis(300),
    );
    let engine = ReconciliationEngine::new(
        EngineConfig::demo(),
        Arc::new(gateway),
        Arc::new(LoggingEventHandler),
    )
    .unwrap();

    print_orders(&engine);

    // A typing burst: only the last value is validated
    println!("Typing 0.9, 0.92, 0.925 into eur...");
    for typed in [Decimal::new(9, 1), Decimal::new(92, 2), Decimal::new(925, 3)] {
        engine.edit_rate("eur", typed).unwrap();
        println!("  eur: {:?}", engine.rate_state("eur").unwrap());
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    tokio::time::sleep(Duration::from_millis(1000)).await;
    println!("  eur: {:?}\n", engine.rate_state("eur").unwrap());

    // An out-of-band value is rolled back
    println!("Typing 42 into usd...");
    engine.edit_rate("usd", Decimal::new(42, 0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    println!("  usd: {:?}\n", engine.rate_state("usd").unwrap());

    // New orders start from the template and follow their currency
    let id = engine.add_order().unwrap();
    engine.edit_price(id.as_str(), Decimal::new(250, 0)).unwrap();
    engine.select_currency(id.as_str(), "cny").unwrap();

    print_orders(&engine);
}

fn print_orders(engine: &ReconciliationEngine) {
    println!("Orders:");
    for order in engine.orders() {
        println!(
            "  {:<12} {:>10} {:<4} = {:>10} {}",
            order.title,
            order.price,
            order.currency,
            order.base_currency_price,
            engine.base_currency()
        );
    }
    println!("  Total: {} {}\n", engine.total(), engine.base_currency());
}
