//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod container;
mod error;
mod reconciler;
mod supervisor;
mod template;

use clap::{App, Arg};
use config::Config;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

fn init_tracing(text: bool) {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("hostroute=info".parse().unwrap())
        .from_env_lossy();

    let layer = tracing_subscriber::fmt::layer().with_target(false);
    let layer = if text {
        layer.compact().boxed()
    } else {
        layer.json().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .init();
}

fn main() {
    let matches = App::new("hostroute-daemon")
        .version(clap::crate_version!())
        .about("Advertises BGP host-routes for container addresses")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file"),
        )
        .arg(
            Arg::with_name("router-id")
                .long("router-id")
                .value_name("address")
                .help("Router ID and next-hop; an IP literal or address template"),
        )
        .arg(
            Arg::with_name("asn")
                .long("asn")
                .value_name("asn")
                .help("Local and remote ASN (iBGP)"),
        )
        .arg(
            Arg::with_name("peer")
                .long("peer")
                .value_name("addresses")
                .help("Comma-separated upstream neighbor addresses"),
        )
        .arg(
            Arg::with_name("network")
                .long("network")
                .value_name("names")
                .help("Comma-separated, ordered list of watched container networks"),
        )
        .arg(
            Arg::with_name("default-route")
                .long("default-route")
                .value_name("address")
                .help("Optional container-side default gateway; an IP literal or address template"),
        )
        .arg(
            Arg::with_name("proc-root")
                .long("proc-root")
                .value_name("path")
                .help("Host proc filesystem root used to resolve container namespaces"),
        )
        .arg(
            Arg::with_name("text")
                .long("text")
                .help("Emit human-readable logs instead of structured JSON"),
        )
        .get_matches();

    let config_file = matches.value_of("config");
    let config = Config::load(config_file, &matches);

    init_tracing(config.text_logs);

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    info!("starting up");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime");

    let exit_code = runtime.block_on(async {
        let resolved = match config.resolve().await {
            Ok(resolved) => resolved,
            Err(error) => {
                error!(%error, "failed to resolve configuration");
                return 1;
            }
        };

        match supervisor::run(resolved).await {
            Ok(()) => 0,
            Err(error) => {
                error.log();
                1
            }
        }
    });

    std::process::exit(exit_code);
}
