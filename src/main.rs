use clap::Parser;
use std::path::PathBuf;

/// Tick-timed loadout and protection switcher driven by a local game-state feed.
#[derive(Debug, Parser)]
#[command(name = "tick-switcher", version, about)]
struct Cli {
    /// Config file (default: config.toml in the per-user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose per-step logging
    #[arg(long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();
    let opts = tick_switcher_lib::RunOptions { config_path: cli.config, debug: cli.debug };
    if let Err(e) = tick_switcher_lib::run(opts) {
        eprintln!("tick-switcher: {:#}", e);
        std::process::exit(1);
    }
}
