use clap::{Parser, ValueEnum};
use client::network::Client;
use log::info;
use shared::world::team::TeamId;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TeamArg {
    Blue,
    Red,
}

impl From<TeamArg> for TeamId {
    fn from(team: TeamArg) -> Self {
        match team {
            TeamArg::Blue => TeamId::A,
            TeamArg::Red => TeamId::B,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:6789")]
    server: String,

    /// Name shown to other players
    #[arg(short = 'n', long, default_value = "Player")]
    nick: String,

    /// Team to ask for; the server balances teams when omitted
    #[arg(short = 't', long, value_enum)]
    team: Option<TeamArg>,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let team = args.team.map(TeamId::from);
    let mut client = Client::new(&args.server, &args.nick, team, args.fake_ping).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, leaving"),
    }

    Ok(())
}
