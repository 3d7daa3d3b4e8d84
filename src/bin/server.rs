// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use bazaar_escrow_rs::api::{ApiState, router};
use bazaar_escrow_rs::{
    ChannelSink, Delivery, Engine, NewListing, PayFastGateway, Stock, SwiftPayGateway,
};
use clap::Parser;
use rust_decimal_macros::dec;
use std::process;
use std::sync::Arc;
use std::thread;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Escrow API server - order lifecycle, payments and settlement
///
/// Serves the marketplace escrow core over HTTP. Gateway credentials are
/// read from the environment (see `SWIFTPAY_*` / `PAYFAST_*`).
#[derive(Parser, Debug)]
#[command(name = "bazaar-escrow-rs")]
#[command(about = "Escrow and settlement engine API server", long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, env = "ESCROW_BIND", default_value = "127.0.0.1:5000")]
    bind: String,

    /// Seed a demo seller, buyer, admin and listing at startup
    #[arg(long)]
    seed: bool,
}

fn seed_demo_data(engine: &Engine) {
    let seller = engine.create_user("demo_seller", "seller@example.com", true);
    let buyer = engine.create_user("demo_buyer", "buyer@example.com", false);
    let admin = engine.create_admin("demo_admin", "admin@example.com");

    let listing = engine.create_listing(
        seller,
        NewListing {
            title: "1000 gold coins".to_string(),
            price: dec!(2500),
            commission_rate: dec!(8),
            stock: Stock::Limited { quantity: 10 },
            delivery: Delivery::Instant {
                content: "Redeem code: GOLD-1000-XYZZY".to_string(),
            },
        },
    );

    match listing {
        Ok(listing) => info!(
            %seller, %buyer, %admin, %listing,
            "seeded demo users and listing"
        ),
        Err(err) => error!(%err, "failed to seed demo listing"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let (sink, events) = ChannelSink::unbounded();
    let engine = Arc::new(Engine::with_events(Arc::new(sink)));

    if args.seed {
        seed_demo_data(&engine);
    }

    // Stand-in for the real-time transport: drain engine events into the
    // log. A websocket layer would subscribe here instead.
    thread::spawn(move || {
        for event in events.iter() {
            match serde_json::to_string(&event) {
                Ok(payload) => info!(target: "escrow::events", %payload, "event"),
                Err(err) => error!(%err, "failed to serialize event"),
            }
        }
    });

    let state = ApiState {
        engine,
        swiftpay: Arc::new(SwiftPayGateway::from_env()),
        payfast: Arc::new(PayFastGateway::from_env()),
    };
    let app = router(state);

    let listener = match TcpListener::bind(&args.bind).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(bind = %args.bind, %err, "failed to bind");
            process::exit(1);
        }
    };
    info!(bind = %args.bind, "escrow API server running");

    if let Err(err) = axum::serve(listener, app).await {
        error!(%err, "server error");
        process::exit(1);
    }
}
