use nflow_gen::config;
use nflow_gen::net;
use nflow_gen::netflow::FlowGenerator;
use nflow_gen::pool::WorkerPool;
use nflow_gen::scheduler::{self, Scheduler};
use nflow_gen::task::PacketSender;
mod cmd;

use std::fs;
use std::process;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;

/// The entry point of the application.
///
/// Any error is fatal: it is logged and the process exits with status 1.
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();
    if let Err(e) = run(args) {
        log::error!("{e:#}");
        process::exit(1);
    }
}

fn run(args: cmd::Args) -> anyhow::Result<()> {
    let file_settings = match &args.config {
        Some(path) => {
            let config_str = fs::read_to_string(path)
                .with_context(|| format!("Cannot access the configuration file {path}"))?;
            config::import_config(&config_str)?
        }
        None => config::Settings::default(),
    };
    let default_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let config = args.settings().or(file_settings).resolve(default_seed)?;
    log::debug!("Configuration: {config:?}");

    // the collector address is resolved once, for every worker
    let collector = net::resolve_collector(&config.target, config.port)?;
    log::info!(
        "Sending netflow data to a collector ip: {} and port: {}. Use ctrl^c to terminate the app.",
        collector.ip(),
        collector.port()
    );
    if let Some(proto) = config.spike {
        log::info!("Generating a spike of {proto} traffic");
    }
    log::info!("Generating with seed {}", config.seed);

    let sender = Arc::new(PacketSender::new(
        FlowGenerator::new(config.false_index),
        config.spike,
        config.seed,
    ));
    let pool = WorkerPool::new(net::UdpConnector::new(collector), config.pool.clone())?;
    let rx_stop = scheduler::termination_channel().context("Error setting Ctrl-C handler")?;
    let report = Scheduler::new(pool, Arc::clone(&sender).into_task(), config.num_per_sec)
        .with_duration(args.duration)
        .run(rx_stop)?;
    log::debug!(
        "{} ticks, {} packets sent, {} failed, {} flow records",
        report.ticks,
        report.sent,
        report.failed,
        sender.generator().flow_sequence()
    );
    Ok(())
}
