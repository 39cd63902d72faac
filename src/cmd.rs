use clap::Parser;
use nflow_gen::config::Settings;
use nflow_gen::netflow::Protocol;
use std::time::Duration;

/// Send mock NetFlow version 5 data to a designated collector IP and port.
/// Time stamps in all datagrams are set to UTC.
#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, help = "Target IP address or host name of the netflow collector")]
    pub target: Option<String>,
    #[arg(short, long, help = "Port number of the target netflow collector")]
    pub port: Option<u16>,
    #[arg(
        short,
        long,
        help = "Also generate a spike for the specified protocol: ftp, ssh, dns, http, https, ntp, snmp, imaps, mysql, https_alt, p2p, bittorrent or icmp"
    )]
    pub spike: Option<Protocol>,
    #[arg(
        short,
        long = "num-per-sec",
        visible_alias = "num_per_sec",
        help = "Number of packets to send per second (best effort)"
    )]
    pub num_per_sec: Option<usize>,
    #[arg(
        short,
        long,
        default_value_t = false,
        help = "Generate false SNMP interface indexes: 1 or 2 depending on the source and destination addresses. Otherwise they are set to 0"
    )]
    pub false_index: bool,
    #[arg(short, long, help = "Number of workers, at most the number of CPUs [default: 5]")]
    pub workers: Option<usize>,
    #[arg(long, help = "Seed for random number generation")]
    pub seed: Option<u64>,
    #[arg(short, long, value_parser = humantime::parse_duration, help = "Stop after that duration, such as \"1h 30min\". Runs until interrupted otherwise")]
    pub duration: Option<Duration>,
    #[arg(short, long, help = "Path to a TOML configuration file. Command line options take precedence")]
    pub config: Option<String>,
    #[arg(long, help = "Number of connection attempts of each worker [default: 5]")]
    pub retries: Option<u32>,
    #[arg(long, value_parser = humantime::parse_duration, help = "Pause between two connection attempts [default: 100ms]")]
    pub retry_delay: Option<Duration>,
}

impl Args {
    /// The settings given on the command line
    pub fn settings(&self) -> Settings {
        Settings {
            target: self.target.clone(),
            port: self.port,
            num_per_sec: self.num_per_sec,
            workers: self.workers,
            buffer_factor: None,
            spike: self.spike,
            false_index: self.false_index.then_some(true),
            connect_retries: self.retries,
            // below one millisecond this is 0, which is rejected on resolution
            retry_delay_ms: self
                .retry_delay
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            seed: self.seed,
        }
    }
}
