use chipdeck::audio::{device::CpalSink, AudioSink, NullSink};
use chipdeck::cli::{
    CliApp, Commands, ConfigAction, FavoriteAction, ParseError, StatusDisplay, TransportCommand,
};
use chipdeck::config::{ConfigManager, PlayerConfig};
use chipdeck::engine::{DurationPolicy, EngineFactory, FileResolver, RomDirResolver, UnavailableEngines};
use chipdeck::error::{ConfigError, PlaybackError, PlayerError};
use chipdeck::import::ArchiveImporter;
use chipdeck::library::{Catalog, FavoriteTarget, LibraryStore, SqliteLibrary};
use chipdeck::logging::PlaybackLogger;
use chipdeck::playback::{AdvanceModes, PlaybackOrchestrator, PlaybackSettings};
use log::{error, info, warn};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wires the configuration, library store, decoders and player together
pub struct AppController {
    config_manager: ConfigManager,
    store: Arc<SqliteLibrary>,
    engines: EngineFactory,
}

impl AppController {
    pub fn new() -> Result<Self, PlayerError> {
        if let Err(e) = PlaybackLogger::init() {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let config_manager = ConfigManager::new()?;
        let config = config_manager.get_config().clone();
        let store = Arc::new(SqliteLibrary::open(&config.database_path)?);
        let engines = Self::build_engines(&config);

        info!("Application controller initialized");
        Ok(Self {
            config_manager,
            store,
            engines,
        })
    }

    fn config(&self) -> &PlayerConfig {
        self.config_manager.get_config()
    }

    fn build_engines(config: &PlayerConfig) -> EngineFactory {
        let resolver: Arc<dyn FileResolver> = Arc::new(RomDirResolver::new(config.rom_dir.clone()));
        let policy = DurationPolicy::new(&config.duration, config.sample_rate);
        // No decoder cores are linked; see DECODER_NOTE in the long help
        EngineFactory::new(Arc::new(UnavailableEngines), resolver, policy)
    }

    fn open_sink(sample_rate: u32) -> Arc<dyn AudioSink> {
        match CpalSink::open(sample_rate) {
            Ok(sink) => {
                info!("Audio output: {}", sink.device_name());
                Arc::new(sink)
            }
            Err(e) => {
                warn!("Audio output unavailable, playing silently: {}", e);
                println!("No audio output ({}); playing silently.", e.user_message());
                Arc::new(NullSink::realtime(sample_rate))
            }
        }
    }

    fn load_catalog(&self) -> Result<Catalog, PlayerError> {
        Ok(Catalog::load(self.store.as_ref())?)
    }

    pub async fn execute_command(&mut self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Import { archive } => {
                let archive = CliApp::expand_path(&archive.to_string_lossy());
                let importer = ArchiveImporter::new(
                    self.store.clone(),
                    self.engines.clone(),
                    self.config().library_dir.clone(),
                );
                let games = importer.import_file(&archive)?;
                if games.is_empty() {
                    println!("No playable music found in {}", archive.display());
                }
                for game in games {
                    println!("Imported: {} [id {}]", game.display_name(), game.id);
                }
            }
            Commands::Games => {
                StatusDisplay::display_games(&self.load_catalog()?);
            }
            Commands::Tracks { game } => {
                let catalog = self.load_catalog()?;
                let entry = game
                    .checked_sub(1)
                    .and_then(|index| catalog.game(index))
                    .ok_or(PlaybackError::InvalidGame { index: game })?;
                StatusDisplay::display_tracks(entry, self.config().sample_rate);
            }
            Commands::Favorite { target } => {
                let (target, favorite) = match target {
                    FavoriteAction::Game { id, off } => (FavoriteTarget::Game(id), !off),
                    FavoriteAction::Track { id, off } => (FavoriteTarget::Track(id), !off),
                };
                self.store.update_favorite(target, favorite)?;
                println!(
                    "OK: {:?} {}",
                    target,
                    if favorite { "favorited" } else { "unfavorited" }
                );
            }
            Commands::Play { game, track } => {
                let game = game.checked_sub(1).ok_or(PlaybackError::InvalidGame { index: game })?;
                let track = track.unwrap_or(1);
                let track = track
                    .checked_sub(1)
                    .ok_or(PlaybackError::InvalidTrack { game, track })?;
                self.run_player(Some((game, track))).await?;
            }
            Commands::Config { action } => match action {
                ConfigAction::Show => {
                    let text = toml::to_string_pretty(self.config()).map_err(ConfigError::from)?;
                    println!("# {}", self.config_manager.config_path().display());
                    println!("{}", text);
                }
                ConfigAction::Reset => {
                    self.config_manager.reset_to_defaults()?;
                    println!("OK: Configuration reset to defaults");
                }
            },
        }

        Ok(())
    }

    /// Build a player, optionally start a track, and hand over to interactive mode
    async fn run_player(&mut self, start: Option<(usize, usize)>) -> Result<(), PlayerError> {
        let config = self.config().clone();
        let player = PlaybackOrchestrator::new(
            self.engines.clone(),
            Self::open_sink(config.sample_rate),
            PlaybackSettings::from_config(&config),
            self.load_catalog()?,
        );
        player.set_modes(AdvanceModes {
            loop_mode: config.loop_mode,
            shuffle_mode: config.shuffle_mode,
            favorites_only: config.favorites_only,
        });

        if let Some((game, track)) = start {
            player.load_and_play(game, track)?;
        }

        let result = self.run_interactive_mode(&player).await;
        player.stop();
        self.save_modes(&player);
        result
    }

    pub async fn run_interactive_mode(&mut self, player: &PlaybackOrchestrator) -> Result<(), PlayerError> {
        println!("chipdeck {}", env!("CARGO_PKG_VERSION"));
        println!("Type 'help' for available commands, 'quit' to exit.");
        println!();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let shutdown_flag_clone = shutdown_flag.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!("\nReceived interrupt signal. Shutting down gracefully...");
            shutdown_flag_clone.store(true, Ordering::Relaxed);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut snapshots = player.subscribe();
        let mut now_playing = None;
        // Ctrl-C only sets a flag, so the loop wakes up to look at it
        let mut shutdown_poll = tokio::time::interval(Duration::from_millis(100));
        let mut awaiting_input = false;

        loop {
            if shutdown_flag.load(Ordering::Relaxed) {
                break;
            }

            if !awaiting_input {
                print!("> ");
                let _ = std::io::stdout().flush();
                awaiting_input = true;
            }

            tokio::select! {
                biased;

                line = rx.recv() => {
                    awaiting_input = false;
                    let Some(line) = line else {
                        println!();
                        break;
                    };
                    if line.is_empty() {
                        continue;
                    }
                    match CliApp::parse_command(&line) {
                        Ok(TransportCommand::Quit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Ok(command) => {
                            if let Err(e) = self.handle_transport(player, command) {
                                Self::report_error(&e);
                            }
                        }
                        Err(ParseError::HelpRequested) => CliApp::display_help(),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            println!("Type 'help' for available commands.");
                        }
                    }
                }

                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    let cursor = (snapshot.game_index, snapshot.track_index);
                    if snapshot.is_playing() && now_playing != Some(cursor) {
                        now_playing = Some(cursor);
                        println!("\nNow playing: {} - {}", snapshot.game_name, snapshot.track_title);
                        awaiting_input = false;
                    }
                }

                _ = shutdown_poll.tick() => {
                    if shutdown_flag.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_transport(
        &mut self,
        player: &PlaybackOrchestrator,
        command: TransportCommand,
    ) -> Result<(), PlayerError> {
        match command {
            TransportCommand::Pause => player.pause()?,
            TransportCommand::Resume => player.resume()?,
            TransportCommand::Stop => {
                player.stop();
                println!("OK: Stopped");
            }
            TransportCommand::Next => player.next()?,
            TransportCommand::Prev => player.previous()?,
            TransportCommand::Jump { game, track } => {
                player.load_and_play(game - 1, track - 1)?;
            }
            TransportCommand::Seek(position) => {
                player.seek(position)?;
                println!("Seeked to: {}", StatusDisplay::format_duration(position));
            }
            TransportCommand::Loop(mode) => {
                let mode = mode.unwrap_or_else(|| player.modes().loop_mode.cycle());
                player.set_loop_mode(mode);
                println!("Loop: {}", mode.as_str());
                self.save_modes(player);
            }
            TransportCommand::Shuffle(mode) => {
                let mode = mode.unwrap_or_else(|| player.modes().shuffle_mode.cycle());
                player.set_shuffle_mode(mode);
                println!("Shuffle: {}", mode.as_str());
                self.save_modes(player);
            }
            TransportCommand::FavoritesOnly(on) => {
                let on = on.unwrap_or(!player.modes().favorites_only);
                player.set_favorites_only(on);
                println!("Favorites only: {}", if on { "on" } else { "off" });
                self.save_modes(player);
            }
            TransportCommand::Endless(on) => {
                let on = on.unwrap_or(!player.snapshot().endless_loop);
                player.set_endless_loop(on);
                println!("Endless loop: {}", if on { "on" } else { "off" });
            }
            TransportCommand::Favorite => {
                let snapshot = player.snapshot();
                let (Some(game), Some(index)) = (snapshot.game_index, snapshot.track_index) else {
                    return Err(PlaybackError::NotPlaying.into());
                };
                let track = player
                    .catalog()
                    .track(game, index)
                    .cloned()
                    .ok_or(PlaybackError::InvalidTrack { game, track: index })?;
                player.set_favorite(self.store.as_ref(), FavoriteTarget::Track(track.id), !track.favorite)?;
                println!(
                    "{} {}",
                    if track.favorite { "Unfavorited" } else { "Favorited" },
                    track.display_name()
                );
            }
            TransportCommand::Speed(speed) => {
                player.set_playback_speed(speed);
                println!("Speed: {:.2}x", speed);
            }
            TransportCommand::Devices => StatusDisplay::display_devices(&player.devices()),
            TransportCommand::Volume { device, level } => {
                player.set_device_volume(device - 1, level)?;
            }
            TransportCommand::Spectrum => StatusDisplay::display_spectrum(&player.spectrum()),
            TransportCommand::Status => StatusDisplay::display_full_status(&player.snapshot()),
            TransportCommand::Quit => {}
        }
        Ok(())
    }

    fn save_modes(&mut self, player: &PlaybackOrchestrator) {
        let modes = player.modes();
        if let Err(e) =
            self.config_manager
                .set_modes(modes.loop_mode, modes.shuffle_mode, modes.favorites_only)
        {
            warn!("Could not save playback modes: {}", e);
        }
    }

    fn report_error(error: &PlayerError) {
        log::log!(error.severity().log_level(), "{}", error);
        StatusDisplay::display_error(error);
    }
}

#[tokio::main]
async fn main() {
    let cli = CliApp::parse();

    let mut app = match AppController::new() {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            StatusDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(command) => app.execute_command(command).await,
        None => app.run_player(None).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        AppController::report_error(&e);
        std::process::exit(1);
    }

    info!("Application shutdown complete");
}
