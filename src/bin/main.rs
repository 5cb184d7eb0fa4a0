use clap::{ArgGroup, Parser};
use simpleperf::{ByteSize, Client, Config, Server, Unit};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "simpleperf")]
#[command(about = "A minimal TCP throughput prober", long_about = None)]
#[command(version)]
#[command(group(ArgGroup::new("mode").required(true).args(["server", "client"])))]
struct Cli {
    /// Run in server mode
    #[arg(short, long)]
    server: bool,

    /// Run in client mode
    #[arg(short, long)]
    client: bool,

    /// Address of the server interface to listen on
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Address of the server to connect to
    #[arg(short = 'I', long = "serverAddr", default_value = "127.0.0.1")]
    server_addr: String,

    /// Port to listen on or connect to
    #[arg(short, long, default_value = "12000")]
    port: u16,

    /// Unit for the summary of results (B, KB or MB)
    #[arg(short, long, default_value = "MB")]
    format: Unit,

    /// Number of parallel connections
    #[arg(short = 'P', long, default_value = "1", value_parser = clap::value_parser!(u16).range(1..))]
    parallel: u16,

    /// Total duration in seconds
    #[arg(short, long, default_value = "25")]
    time: u64,

    /// Number of bytes to transfer instead of a duration, e.g. 10MB
    #[arg(short, long)]
    num: Option<ByteSize>,

    /// Number of reporting intervals
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    interval: u32,

    /// Output report lines in JSON format
    #[arg(short = 'J', long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if cli.server {
        let config = Config::server(cli.port)
            .with_bind_addr(cli.bind)
            .with_unit(cli.format)
            .with_json(cli.json);

        let server = Server::new(config);
        server.run().await?;
    } else {
        let mut config = Config::client(cli.server_addr, cli.port)
            .with_unit(cli.format)
            .with_parallel(cli.parallel as usize)
            .with_intervals(cli.interval)
            .with_json(cli.json)
            .with_duration(Duration::from_secs(cli.time));

        if let Some(size) = cli.num {
            config = config.with_size(size);
        }

        let client = Client::new(config)?;
        client.run().await?;
    }

    Ok(())
}
