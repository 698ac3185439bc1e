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

use clap::Parser;
use prepaid_shop_rs::{
    AppState, HttpProviderGateway, MemoryStore, PlanCatalog, Storefront, create_router,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Prepaid Shop - storefront API server
///
/// Serves the storefront REST API backed by the in-memory ledger store.
/// Topups are settled through the simulated payment callback; purchases
/// are provisioned through the configured provider API.
#[derive(Parser, Debug)]
#[command(name = "prepaid-shop-rs")]
#[command(about = "A prepaid-balance storefront API server", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 3000, env = "PORT")]
    port: u16,

    /// Base URL used to render payment links
    ///
    /// Defaults to http://localhost:<port>.
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Provisioning provider endpoint
    #[arg(long, env = "PROVIDER_API_URL", default_value = "http://localhost:9000/create")]
    provider_url: String,

    /// Bearer credential sent to the provider
    #[arg(long, env = "PROVIDER_API_KEY", default_value = "")]
    provider_key: String,

    /// Provider call timeout in seconds
    #[arg(long, default_value_t = 15, env = "PROVIDER_TIMEOUT_SECS")]
    provider_timeout_secs: u64,

    /// Path to a JSON plan catalog (array of plans)
    ///
    /// The bundled sample catalog is served when omitted.
    #[arg(long, value_name = "FILE", env = "PLANS_FILE")]
    plans: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Load .env before clap reads the environment
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prepaid_shop_rs=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let catalog = match &args.plans {
        Some(path) => {
            let data = match std::fs::read_to_string(path) {
                Ok(data) => data,
                Err(e) => {
                    eprintln!("Error reading plan file '{}': {}", path.display(), e);
                    process::exit(1);
                }
            };
            match PlanCatalog::from_json(&data) {
                Ok(catalog) => catalog,
                Err(e) => {
                    eprintln!("Error parsing plan file '{}': {}", path.display(), e);
                    process::exit(1);
                }
            }
        }
        None => PlanCatalog::bundled(),
    };

    let gateway = match HttpProviderGateway::new(
        &args.provider_url,
        &args.provider_key,
        Duration::from_secs(args.provider_timeout_secs),
    ) {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("Error building provider client: {}", e);
            process::exit(1);
        }
    };

    let shop = Storefront::new(Arc::new(MemoryStore::new()), catalog, Arc::new(gateway));
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", args.port));
    let state = AppState {
        shop: Arc::new(shop),
        base_url,
    };

    let app = create_router(state);

    let listener = match TcpListener::bind(("0.0.0.0", args.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding port {}: {}", args.port, e);
            process::exit(1);
        }
    };

    tracing::info!(port = args.port, provider = %args.provider_url, "storefront listening");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}
