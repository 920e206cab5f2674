use clap::Parser;
use color_eyre::Result;
use goaltrack::{
    Config, LocalCache, Profile, SyncCoordinator,
    cli::{self, Cli, Commands},
    remote::HttpRemoteStore,
    scheduler::SystemClock,
};
use std::path::PathBuf;

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config = match &cli.config {
        Some(path) => Config::load_from_path(&PathBuf::from(path))?,
        None => Config::load_with_profile(profile)?,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    let db_path = config.get_database_path();
    let cache = LocalCache::new(
        db_path.to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
    )?;

    let mut coord = SyncCoordinator::with_clock(cache, SystemClock, config.sync.debounce());
    if let Some((url, user)) = config.sync.remote_target() {
        let store = HttpRemoteStore::new(url, config.sync.api_key.clone(), config.sync.timeout());
        coord = coord.with_remote(Box::new(store), user);
        coord.start();
    }

    let command = cli.command.unwrap_or(Commands::Summary { date: None });
    let show_status = matches!(command, Commands::Sync | Commands::Summary { .. });

    let outcome = match command {
        Commands::Summary { date } => cli::handle_summary(&coord, date),
        Commands::Goals { all } => cli::handle_goals(&coord, all),
        Commands::AddGoal { title, category, reminder } => {
            cli::handle_add_goal(&mut coord, title, category, reminder)
        }
        Commands::AddSubtask { goal, text, hard } => {
            cli::handle_add_subtask(&mut coord, goal, text, hard)
        }
        Commands::RemoveGoal { goal } => cli::handle_remove_goal(&mut coord, goal),
        Commands::Check { goal, subtask, date } => cli::handle_check(&mut coord, goal, subtask, date),
        Commands::Note { text, date } => cli::handle_note(&mut coord, text, date),
        Commands::Filter { category } => cli::handle_filter(&mut coord, category),
        Commands::Stats { range } => cli::handle_stats(&coord, range),
        Commands::Heatmap => cli::handle_heatmap(&coord),
        Commands::Sync => Ok(()),
        Commands::Reset { yes } => cli::handle_reset(&mut coord, yes),
    };

    // Don't wait out the debounce window on exit
    coord.flush();
    if show_status || coord.last_error().is_some() {
        cli::print_status(&coord);
    }
    coord.sign_out();

    outcome?;
    Ok(())
}
