use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;
use mbus_master::mbus::master::{MBusMaster, MasterConfig};
use mbus_master::mbus::transport::{open_serial, StreamTransport};
use mbus_master::util::frame_from_hex;
use mbus_master::{init_logger, MBusError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mbus-master")]
#[command(about = "M-Bus master: read meters and decode captured frames")]
struct Cli {
    /// JSON file with master settings (timeouts, retries, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Line {
    /// Serial device, e.g. /dev/ttyUSB0
    #[arg(long, conflicts_with = "tcp")]
    serial: Option<String>,

    /// TCP level converter, e.g. 192.168.1.20:10001
    #[arg(long)]
    tcp: Option<String>,

    #[arg(short, long, default_value = "2400")]
    baudrate: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a frame given in hex and print it as JSON
    Decode { hex: String },
    /// Send SND_NKE to a primary address
    Init {
        #[command(flatten)]
        line: Line,
        address: u8,
    },
    /// Read all telegrams of a slave and print the merged response as JSON
    Read {
        #[command(flatten)]
        line: Line,
        address: u8,
    },
    /// Poll primary addresses 0-250 and list the slaves that answer
    Scan {
        #[command(flatten)]
        line: Line,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MasterConfig> {
    let Some(path) = path else {
        return Ok(MasterConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

async fn connect(line: &Line, config: MasterConfig) -> anyhow::Result<MBusMaster> {
    let master = match (&line.serial, &line.tcp) {
        (Some(port), _) => MBusMaster::spawn(open_serial(port, line.baudrate)?, config),
        (None, Some(addr)) => {
            let stream = tokio::net::TcpStream::connect(addr)
                .await
                .with_context(|| format!("connecting to {addr}"))?;
            MBusMaster::spawn(StreamTransport::new(stream, line.baudrate), config)
        }
        (None, None) => bail!("either --serial or --tcp is required"),
    };
    Ok(master)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Decode { hex } => {
            let frame = frame_from_hex(&hex)?;
            println!("{}", serde_json::to_string_pretty(&frame)?);
        }
        Commands::Init { line, address } => {
            let master = connect(&line, config).await?;
            master.init_slave(address).await?;
            info!("slave {address} initialized");
            master.close();
        }
        Commands::Read { line, address } => {
            let master = connect(&line, config).await?;
            master.init_slave(address).await?;
            let response = master.read_user_data(address).await?;
            println!("{}", response.to_json()?);
            master.close();
        }
        Commands::Scan { line } => {
            let master = connect(&line, config.with_max_retries(0)).await?;
            for address in 0..=250u8 {
                match master.request_user_data(address).await {
                    Ok(response) => {
                        let id = response.device_id(address);
                        println!(
                            "{address:3}: {} {:08} v{} {:?}",
                            id.manufacturer, id.ident_number, id.version, id.medium
                        );
                    }
                    Err(MBusError::NoResponse { .. }) => {}
                    Err(e) => println!("{address:3}: {e}"),
                }
            }
            master.close();
        }
    }

    Ok(())
}
