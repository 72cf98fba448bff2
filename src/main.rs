use crossbeam_channel::bounded;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use um6_io::config::DriverConfig;
use um6_io::session::{SerialConnector, Session};
use um6_io::streaming::{CommandServer, Serializer, TcpPublisher, TelemetryPublisher};
use um6_io::Result;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `um6-io <path>` (positional)
/// - `um6-io --config <path>` (flag-based)
/// - `um6-io -c <path>` (short flag)
///
/// Defaults to `/etc/um6-io.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/um6-io.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = DriverConfig::from_file(&config_path)?;

    // RUST_LOG still overrides the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("um6-io starting");
    log::info!("Using config: {}", config_path);
    log::info!("Device: {} at {} baud", config.device.port, config.device.baud);

    let running = Arc::new(AtomicBool::new(true));
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signal_running = Arc::clone(&running);
    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                log::info!("Received signal {}, shutting down", signal);
                signal_running.store(false, Ordering::Relaxed);
            }
        })?;

    let serializer = Serializer::new(config.streaming.format);
    let publisher = TcpPublisher::bind(&config.streaming.pub_address)?;
    let (command_tx, command_rx) = bounded(16);
    let command_server = CommandServer::spawn(&config.streaming.cmd_address, serializer, command_tx)?;

    let telemetry = TelemetryPublisher::new(publisher.handle(), serializer, &config);
    let connector = SerialConnector::new(&config.device);
    let mut session = Session::new(connector, config, telemetry, command_rx, Arc::clone(&running));

    // The session loop owns the serial link for the life of the daemon.
    session.run();

    log::info!("Shutting down");
    command_server.stop();
    publisher.stop();

    log::info!("um6-io stopped");
    Ok(())
}
