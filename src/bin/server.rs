//! Room coordination server for festival kiosk sessions.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;

use clap::Parser;
use kiosk_rooms_rs::{
    aggregator::SlidingWindowAggregator,
    collaborator::{
        aggregation::{AggregationService, LocalAggregationService},
        order::{HttpOrderService, OrderService},
    },
    common::logger::setup_logger,
    server::{run_server, state::AppState},
};

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Festival kiosk room coordination server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Base URL of the upstream order API
    #[arg(long, default_value = "http://localhost:8081")]
    order_base_url: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let order_service: Arc<dyn OrderService> = match HttpOrderService::new(args.order_base_url) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!("Failed to build order client: {}", e);
            std::process::exit(1);
        }
    };
    let aggregation_service: Arc<dyn AggregationService> = Arc::new(LocalAggregationService::new(
        Arc::new(SlidingWindowAggregator::new()),
    ));
    let state = Arc::new(AppState::new(order_service, aggregation_service));

    if let Err(e) = run_server(args.host, args.port, state).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
