//! Demo binary that drives the replication relay.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p netrep-demo` for an in-process session with two observers.
//! Run with `cargo run -p netrep-demo -- --mode serve` to host a TCP authority and
//! `cargo run -p netrep-demo -- --mode connect` in another terminal to join it.

mod script;

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use netrep_config::{CliArgs, Config, default_config_dir};
use netrep_net::{
    ClientConfig, CodecConfig, FrameConfig, LoopbackEndpoint, LoopbackHub, NetworkCounters,
    RelayClient, RelayServer, ServerConfig,
};
use netrep_relay::{Clock, MonotonicClock, RelayDispatcher, ReplicationSettings, Transport};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Authority and observers in one process over the loopback hub.
    Local,
    /// TCP authority.
    Serve,
    /// TCP observer submitting the scripted requests.
    Connect,
}

#[derive(Parser, Debug)]
#[command(name = "netrep", about = "Authoritative state-change relay demo")]
struct DemoArgs {
    #[command(flatten)]
    cli: CliArgs,

    #[arg(long, value_enum, default_value_t = Mode::Local)]
    mode: Mode,

    /// Observers created in local mode.
    #[arg(long, default_value_t = 2)]
    observers: usize,

    /// Scripted requests to submit.
    #[arg(long, default_value_t = 20)]
    requests: usize,

    /// Entities the script cycles over.
    #[arg(long, default_value_t = 3)]
    entities: usize,

    /// How long serve and connect modes run.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,
}

fn main() {
    let args = DemoArgs::parse();

    // Resolve config directory
    let config_dir = match args.cli.config.clone() {
        Some(dir) => dir,
        None => default_config_dir().unwrap_or_else(|e| {
            eprintln!("{e}, using ./netrep");
            PathBuf::from("netrep")
        }),
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.cli);

    let log_dir = config_dir.join("logs");
    netrep_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let result = match args.mode {
        Mode::Local => run_local(&config, &args),
        Mode::Serve | Mode::Connect => {
            match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) if args.mode == Mode::Serve => {
                    runtime.block_on(run_serve(&config, &args))
                }
                Ok(runtime) => runtime.block_on(run_connect(&config, &args)),
                Err(e) => Err(e.into()),
            }
        }
    };

    if let Err(e) = result {
        tracing::error!("netrep {:?} failed: {e}", args.mode);
        std::process::exit(1);
    }
}

fn codec_config(config: &Config) -> CodecConfig {
    CodecConfig::from_settings(
        &ReplicationSettings::from_config(&config.replication),
        &config.network,
    )
}

fn authority_addr(config: &Config) -> Result<SocketAddr, std::net::AddrParseError> {
    format!(
        "{}:{}",
        config.network.server_address, config.network.server_port
    )
    .parse()
}

/// Feeds one traffic sample into the dispatcher's bandwidth history.
fn sample_bandwidth<T: Transport, C: Clock>(
    dispatcher: &mut RelayDispatcher<T, C>,
    counters: &NetworkCounters,
    since: &mut Instant,
) {
    let elapsed = since.elapsed().as_secs_f32();
    let traffic = counters.snapshot_and_reset();
    dispatcher
        .instrumentation_mut()
        .record_bandwidth(traffic.kb_per_sec(elapsed));
    if traffic.messages_sent > 0 {
        info!(
            "Traffic: {} sent, {:.2} KB, compression {:.2}",
            traffic.messages_sent,
            traffic.total_kb(),
            traffic.send_compression_ratio()
        );
    }
    *since = Instant::now();
}

fn finish<T: Transport, C: Clock>(dispatcher: &RelayDispatcher<T, C>, config: &Config) {
    let snapshot = dispatcher.snapshot();
    println!("{}", snapshot.detailed_report());
    println!("{}", snapshot.network_insights());
    println!("{}", dispatcher.replication_stats());

    if let Some(dir) = &config.debug.export_dir {
        match dispatcher.export(dir) {
            Ok((text, json)) => info!(
                "Exported replication data to {} and {}",
                text.display(),
                json.display()
            ),
            Err(e) => warn!("Export failed: {e}"),
        }
    }
}

type LocalNode = RelayDispatcher<LoopbackEndpoint, MonotonicClock>;

fn pump_local(node: &mut LocalNode) {
    let inbound = node.transport().drain();
    for message in inbound {
        if let Err(e) = node.receive(message) {
            warn!("Dropped inbound message: {e}");
        }
    }
}

fn run_local(config: &Config, args: &DemoArgs) -> Result<(), Box<dyn Error>> {
    let hub = LoopbackHub::new(codec_config(config));
    let mut authority = LocalNode::with_config(hub.authority(), MonotonicClock::new(), config);
    let mut observers: Vec<LocalNode> = (0..args.observers)
        .map(|_| LocalNode::with_config(hub.add_observer(), MonotonicClock::new(), config))
        .collect();
    let applied: Vec<_> = observers
        .iter_mut()
        .map(|obs| script::count_applied(obs.listeners_mut()))
        .collect();

    for step in 0..args.entities {
        authority.register(script::source(step, args.entities));
    }
    info!(
        "Local session: {} observers, {} entities, {} requests",
        observers.len(),
        authority.registry().count(),
        args.requests
    );

    let mut since = Instant::now();
    for step in 0..args.requests {
        let source = script::source(step, args.entities);
        let change = script::change(step);
        // Odd steps originate on an observer and take the two-hop path.
        let result = if step % 2 == 1 && !observers.is_empty() {
            let idx = (step / 2) % observers.len();
            observers[idx].replicate(source, change)
        } else {
            authority.replicate(source, change)
        };
        if let Err(e) = result {
            warn!("Step {step} rejected: {e}");
        }
        pump_local(&mut authority);
        for obs in &mut observers {
            pump_local(obs);
        }
    }
    sample_bandwidth(&mut authority, hub.counters(), &mut since);

    for (i, count) in applied.iter().enumerate() {
        info!("Observer {} applied {} changes", i + 1, count.get());
    }
    finish(&authority, config);
    Ok(())
}

async fn run_serve(config: &Config, args: &DemoArgs) -> Result<(), Box<dyn Error>> {
    let server_config = ServerConfig::from_config(config, codec_config(config))?;
    let (server, handle) = RelayServer::new(server_config);
    let server = Arc::new(server);
    let accept = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    let mut authority = RelayDispatcher::with_config(handle, MonotonicClock::new(), config);
    let tick = Duration::from_secs_f32(authority.settings().replication_interval.max(0.01));
    let mut interval = tokio::time::interval(tick);
    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let mut since = Instant::now();

    while Instant::now() < deadline {
        interval.tick().await;
        let inbound = authority.transport().drain();
        for message in inbound {
            if let Err(e) = authority.receive(message) {
                warn!("Rejected forwarded request: {e}");
            }
        }
        if since.elapsed() >= Duration::from_secs(1) {
            let handle = authority.transport().clone();
            sample_bandwidth(&mut authority, handle.counters(), &mut since);
        }
    }

    info!(
        "Shutting down with {} connections",
        authority.transport().connection_count()
    );
    server.shutdown();
    accept.await??;
    finish(&authority, config);
    Ok(())
}

async fn run_connect(config: &Config, args: &DemoArgs) -> Result<(), Box<dyn Error>> {
    let client_config = ClientConfig {
        frame: FrameConfig::from_config(&config.network),
        codec: codec_config(config),
    };
    let client = RelayClient::connect(authority_addr(config)?, client_config).await?;
    let mut observer = RelayDispatcher::with_config(client, MonotonicClock::new(), config);
    let applied = script::count_applied(observer.listeners_mut());

    let tick = Duration::from_secs_f32(observer.settings().replication_interval.max(0.01));
    let mut interval = tokio::time::interval(tick);
    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let mut step = 0;

    while Instant::now() < deadline {
        interval.tick().await;
        if step < args.requests {
            observer.replicate(script::source(step, args.entities), script::change(step))?;
            step += 1;
        }
        let inbound = observer.transport().drain();
        for message in inbound {
            if let Err(e) = observer.receive(message) {
                warn!("Dropped broadcast: {e}");
            }
        }
        if step == args.requests && applied.get() >= args.requests {
            break;
        }
    }

    info!(
        "Submitted {step} requests, applied {} broadcasts",
        applied.get()
    );
    observer.transport().disconnect();
    finish(&observer, config);
    Ok(())
}
