// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Example NTS-authenticated NTP server with NTS-KE TLS endpoint.
//!
//! Runs an NTS-KE server (TLS key establishment) and an NTP server that
//! answers NTS-authenticated requests, sharing one master key store that is
//! rotated daily.
//!
//! You must provide TLS certificate and key files:
//!
//! ```sh
//! RUST_LOG=debug cargo run -p ntsec-server --example nts_server -- \
//!     --cert server.crt --key server.key
//! ```

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use ntsec_server::cookie::{DEFAULT_GRACE_PERIOD, MasterKeyStore};
use ntsec_server::nts_ke_server::{NtsKeServer, NtsKeServerConfig};
use ntsec_server::protocol::Stratum;
use ntsec_server::server::{NtpServer, spawn_key_rotation};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (cert_path, key_path) = parse_args(&args)?;

    let cert_pem = std::fs::read(&cert_path)?;
    let key_pem = std::fs::read(&key_path)?;

    // Shared master key store with 24-hour grace period for retired keys.
    let key_store = Arc::new(RwLock::new(MasterKeyStore::new(DEFAULT_GRACE_PERIOD)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let rotation = spawn_key_rotation(
        key_store.clone(),
        Duration::from_secs(24 * 3600),
        shutdown_rx.clone(),
    );

    // NTS-KE server (TLS on port 4460), pointing clients at port 1123.
    let mut ke_config = NtsKeServerConfig::from_pem(&cert_pem, &key_pem)?;
    ke_config.listen_addr = "0.0.0.0:4460".to_string();
    ke_config.ntp_port = Some(1123);
    let ke_server = NtsKeServer::bind(ke_config, key_store.clone()).await?;

    // NTP server (UDP on port 1123).
    let ntp_server = NtpServer::builder()
        .listen("0.0.0.0:1123")
        .stratum(Stratum(2))
        .nts(key_store)
        .build()
        .await?;

    tracing::info!(
        ntp = %ntp_server.local_addr()?,
        nts_ke = %ke_server.local_addr()?,
        "serving"
    );

    // Run both servers until either fails.
    let result = tokio::select! {
        result = ntp_server.run_until(shutdown_rx.clone()) => result,
        result = ke_server.run_until(shutdown_rx) => result,
    };
    let _ = shutdown_tx.send(true);
    let _ = rotation.await;
    result
}

fn parse_args(args: &[String]) -> std::io::Result<(String, String)> {
    let mut cert = None;
    let mut key = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--cert" => {
                i += 1;
                cert = args.get(i).cloned();
            }
            "--key" => {
                i += 1;
                key = args.get(i).cloned();
            }
            _ => {}
        }
        i += 1;
    }

    let usage = || {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "usage: nts_server --cert <cert.pem> --key <key.pem>",
        )
    };
    Ok((cert.ok_or_else(usage)?, key.ok_or_else(usage)?))
}
