use clap::Parser;
use log::{error, info};
use server::game::LocalGame;
use server::level::{LobbyLevel, StandardSettings};
use server::network::Server;
use shared::world::layout::MapLayout;
use shared::{DebugContext, GameConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "6789")]
    port: u16,
    /// Most players allowed on one team
    #[clap(long, default_value = "8")]
    max_per_team: usize,
    /// Most players allowed in the game
    #[clap(long, default_value = "16")]
    max_total: usize,
    /// Ticks per second
    #[clap(short, long, default_value = "20")]
    tick_rate: u32,
    /// Hold every timestamped request back at least this many ticks
    #[clap(long)]
    force_delay: Option<i32>,
    /// Stretch wall-clock time between ticks by this factor
    #[clap(long, default_value = "1.0")]
    slow_motion: f64,
    /// Number of bots to add at startup
    #[clap(short, long, default_value = "0")]
    bots: usize,
    /// Players needed in the lobby before a round starts
    #[clap(long, default_value = "2")]
    lobby_players: usize,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        let tick_rate = self.tick_rate.max(1);
        GameConfig {
            tick_period: Duration::from_secs_f64(1.0 / tick_rate as f64),
            debug: DebugContext {
                force_delay: self.force_delay,
                slow_motion_factor: self.slow_motion,
            },
            ..GameConfig::default()
        }
        .with_capacity(self.max_per_team, self.max_total)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = args.game_config();
    info!(
        "Starting arena server: {} Hz, {} per team, {} total",
        args.tick_rate,
        config.max_per_team,
        config.max_total_players()
    );

    // Room for spectators on top of the players
    let max_clients = config.max_total_players() * 2;
    let mut game = LocalGame::new(config, MapLayout::lobby(3));
    game.start_level(Box::new(LobbyLevel::new(args.lobby_players, StandardSettings::default())));
    for n in 0..args.bots {
        game.add_bot(&format!("Bot{}", n + 1), None);
    }

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, game, max_clients).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
