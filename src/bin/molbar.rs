//! molbar - client for a running molbard
//!
//! # Usage
//!
//! ```bash
//! # Supply atoms over TCP
//! molbar add --tcp 127.0.0.1:5555 CARBON 10
//!
//! # Request molecules over UDP
//! molbar deliver --udp 127.0.0.1:5556 CARBON DIOXIDE 2
//!
//! # Same over Unix sockets
//! molbar add --stream-path /tmp/molbar.sock HYDROGEN 4
//! molbar deliver --datagram-path /tmp/molbar.dgram WATER 1
//!
//! # Read a shared inventory file
//! molbar inspect /tmp/stock.bin
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use molbar_core::Atom;
use molbard::client::{DatagramRequester, ServerAddr, StreamSupplier};
use molbard::store::read_record;

/// molbar client
#[derive(Parser, Debug)]
#[command(name = "molbar", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Supply atoms to the server
    Add {
        #[command(flatten)]
        target: StreamTarget,

        /// CARBON, HYDROGEN or OXYGEN
        atom: Atom,

        quantity: u64,
    },
    /// Request molecules and print the reply
    Deliver {
        #[command(flatten)]
        target: DatagramTarget,

        /// Seconds to wait for the reply
        #[arg(long, default_value_t = 5)]
        wait: u64,

        /// Molecule name followed by the quantity, e.g. `CARBON DIOXIDE 2`
        #[arg(required = true, num_args = 2..=3)]
        request: Vec<String>,
    },
    /// Print the counters stored in an inventory file
    Inspect { file: PathBuf },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct StreamTarget {
    /// Server TCP address
    #[arg(long)]
    tcp: Option<SocketAddr>,

    /// Server Unix stream socket
    #[arg(long)]
    stream_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct DatagramTarget {
    /// Server UDP address
    #[arg(long)]
    udp: Option<SocketAddr>,

    /// Server Unix datagram socket
    #[arg(long)]
    datagram_path: Option<PathBuf>,
}

fn server_addr(inet: Option<SocketAddr>, local: Option<PathBuf>) -> Result<ServerAddr> {
    match (inet, local) {
        (Some(addr), None) => Ok(ServerAddr::Inet(addr)),
        (None, Some(path)) => Ok(ServerAddr::Local(path)),
        _ => bail!("exactly one server address is required"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Add {
            target,
            atom,
            quantity,
        } => {
            let addr = server_addr(target.tcp, target.stream_path)?;
            let mut supplier = StreamSupplier::connect(&addr).await?;
            supplier.add(atom, quantity).await?;
            supplier.exit().await?;
            println!("Sent ADD {atom} {quantity}");
        }
        Command::Deliver {
            target,
            wait,
            request,
        } => {
            let (quantity, name) = match request.split_last() {
                Some((quantity, name)) => (quantity, name.join(" ")),
                None => bail!("missing molecule and quantity"),
            };
            let quantity: u64 = quantity
                .parse()
                .with_context(|| format!("invalid quantity: {quantity}"))?;

            let addr = server_addr(target.udp, target.datagram_path)?;
            let reply_path =
                std::env::temp_dir().join(format!("molbar-client-{}.sock", process::id()));
            let requester = DatagramRequester::connect(&addr, &reply_path)
                .await?
                .with_timeout(Duration::from_secs(wait));

            let reply = requester.deliver(&name, quantity).await;
            // Unlinks the reply socket before any early exit.
            drop(requester);

            let reply = reply?;
            println!("{reply}");
            if !reply.is_success() {
                process::exit(2);
            }
        }
        Command::Inspect { file } => {
            let counts = read_record(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            for atom in Atom::ALL {
                println!("{:<8} {}", atom.name(), counts.get(atom));
            }
        }
    }

    Ok(())
}
