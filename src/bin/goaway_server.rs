//! goaway-server - HTTP/2 GOAWAY fault injector
//!
//! Usage: goaway-server [OPTIONS]

use reconnect_harness::config::ServerCommand;
use reconnect_harness::server::FaultInjectingServerBuilder;
use std::process::ExitCode;

fn main() -> ExitCode {
    let command = match ServerCommand::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {}", e);
            print_usage();
            return ExitCode::from(1);
        }
    };

    if command.help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_max_level(command.log_level)
        .with_thread_names(true)
        .init();

    let server = match FaultInjectingServerBuilder::from_config(command.config.clone()).bind() {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(port = command.config.port, error = %e, "failed to start fault injector");
            return ExitCode::from(1);
        }
    };

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    }) {
        tracing::error!(error = %e, "cannot install signal handler");
        return ExitCode::from(1);
    }

    if let Err(e) = server.start() {
        tracing::error!(error = %e, "failed to start accept loop");
        return ExitCode::from(1);
    }

    tracing::info!(
        addr = %server.local_addr(),
        goaway_interval_ms = command.config.goaway_interval.as_millis() as u64,
        backlog = command.config.backlog,
        "fault injector running, Ctrl-C to stop"
    );

    let _ = stop_rx.recv();
    server.shutdown();
    server.join();
    tracing::info!(accepted = server.accepted_connections(), "fault injector stopped");

    ExitCode::SUCCESS
}

fn print_usage() {
    println!("goaway-server - HTTP/2 GOAWAY fault injector");
    println!();
    println!("USAGE:");
    println!("    goaway-server [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help                      Show this help message");
    println!("    -p, --port <PORT>               TCP port to listen on (default 9991)");
    println!("    -i, --goaway-interval-ms <MS>   Delay between GOAWAY frames (default 60000)");
    println!("    -b, --backlog <N>               Pending connections queued by the kernel (default 128)");
    println!("    -c, --config <FILE>             YAML file with a ctf-server section (port, goaway-interval-ms, backlog)");
    println!("        --log-level <LEVEL>         trace|debug|info|warn|error (default info)");
}
