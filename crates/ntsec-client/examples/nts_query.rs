// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Query an NTS server and print the measured offset.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p ntsec-client --example nts_query -- time.cloudflare.com
//! ```

use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use ntsec_client::nts::NtsSession;
use ntsec_client::nts_ke::NtsKeConfig;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "time.cloudflare.com".to_string());
    let config = NtsKeConfig::new(server.as_str()).timeout(Duration::from_secs(5));

    let mut session = NtsSession::from_ke(&config).await?;
    println!(
        "NTS-KE with {server}: {:?}, {} cookies, NTP at {}",
        session.aead_algorithm(),
        session.cookie_count(),
        session.ntp_addr()
    );

    for _ in 0..3 {
        let result = session.request().await?;
        println!(
            "offset {:+.6}s  delay {:.6}s  stratum {}  cookies {}",
            result.offset_seconds,
            result.delay_seconds,
            result.stratum.0,
            session.cookie_count()
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    Ok(())
}
