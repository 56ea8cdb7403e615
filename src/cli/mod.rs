use crate::models::{LoopMode, ShuffleMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub mod status;
pub use status::StatusDisplay;

/// Shown in the long help while the binary links no decoder cores
pub const DECODER_NOTE: &str = "This build has no decoder cores built in. \
Imports record loose tracks with unknown lengths and skip MSX containers. \
Playback reports the engine as unavailable until native engine bindings are linked.";

/// Chiptune archive library and player
#[derive(Parser)]
#[command(name = "chipdeck")]
#[command(about = "Import game music archives and play them through native chip emulators")]
#[command(after_long_help = DECODER_NOTE)]
#[command(version)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract an archive into the library and catalog its games
    Import {
        /// ZIP or RAR archive
        archive: PathBuf,
    },
    /// List the games in the library
    Games,
    /// List the tracks of a game
    Tracks {
        /// Game number as shown by `games`
        game: usize,
    },
    /// Mark or unmark a favorite
    Favorite {
        #[command(subcommand)]
        target: FavoriteAction,
    },
    /// Play a game and enter interactive transport mode
    Play {
        /// Game number as shown by `games`
        game: usize,
        /// Track number within the game
        track: Option<usize>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum FavoriteAction {
    /// Favorite a game by id
    Game {
        id: i64,
        /// Remove the flag instead
        #[arg(long)]
        off: bool,
    },
    /// Favorite a track by id
    Track {
        id: i64,
        #[arg(long)]
        off: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Restore defaults
    Reset,
}

/// Commands accepted while a game is playing
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Pause,
    Resume,
    Stop,
    Next,
    Prev,
    /// Jump to a game and track, 1-based
    Jump { game: usize, track: usize },
    Seek(Duration),
    /// Explicit mode, or `None` to cycle
    Loop(Option<LoopMode>),
    Shuffle(Option<ShuffleMode>),
    FavoritesOnly(Option<bool>),
    Endless(Option<bool>),
    /// Toggle the favorite flag of the playing track
    Favorite,
    Speed(f64),
    Devices,
    Volume { device: usize, level: u16 },
    Spectrum,
    Status,
    Quit,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => PathBuf::from(path),
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Parse one line of interactive input
    pub fn parse_command(input: &str) -> Result<TransportCommand, ParseError> {
        let args: Vec<&str> = input.split_whitespace().collect();
        let Some(&name) = args.first() else {
            return Err(ParseError::EmptyCommand);
        };

        match name {
            "pause" => Ok(TransportCommand::Pause),
            "resume" => Ok(TransportCommand::Resume),
            "stop" => Ok(TransportCommand::Stop),
            "next" | "n" => Ok(TransportCommand::Next),
            "prev" | "previous" | "p" => Ok(TransportCommand::Prev),
            "play" => {
                let game = Self::required_number(&args, 1, "play", "game")?;
                let track = match args.get(2) {
                    Some(value) => Self::parse_number(value, "track")?,
                    None => 1,
                };
                Ok(TransportCommand::Jump { game, track })
            }
            "seek" => {
                let position = args.get(1).ok_or_else(|| ParseError::MissingArgument {
                    command: "seek".to_string(),
                    argument: "position".to_string(),
                })?;
                Ok(TransportCommand::Seek(Self::parse_time(position)?))
            }
            "loop" => match args.get(1) {
                None => Ok(TransportCommand::Loop(None)),
                Some(&"off") => Ok(TransportCommand::Loop(Some(LoopMode::Off))),
                Some(&"track") => Ok(TransportCommand::Loop(Some(LoopMode::Track))),
                Some(&"game") => Ok(TransportCommand::Loop(Some(LoopMode::Game))),
                Some(other) => Err(ParseError::InvalidArgument {
                    argument: "loop mode".to_string(),
                    value: other.to_string(),
                    expected: "off, track or game".to_string(),
                }),
            },
            "shuffle" => match args.get(1) {
                None => Ok(TransportCommand::Shuffle(None)),
                Some(&"off") => Ok(TransportCommand::Shuffle(Some(ShuffleMode::Off))),
                Some(&"game") => Ok(TransportCommand::Shuffle(Some(ShuffleMode::Game))),
                Some(&"all") => Ok(TransportCommand::Shuffle(Some(ShuffleMode::All))),
                Some(other) => Err(ParseError::InvalidArgument {
                    argument: "shuffle mode".to_string(),
                    value: other.to_string(),
                    expected: "off, game or all".to_string(),
                }),
            },
            "favorites" => Ok(TransportCommand::FavoritesOnly(Self::optional_switch(
                args.get(1),
                "favorites",
            )?)),
            "endless" => Ok(TransportCommand::Endless(Self::optional_switch(
                args.get(1),
                "endless",
            )?)),
            "fav" | "favorite" => Ok(TransportCommand::Favorite),
            "speed" => {
                let value = args.get(1).ok_or_else(|| ParseError::MissingArgument {
                    command: "speed".to_string(),
                    argument: "factor".to_string(),
                })?;
                match value.parse::<f64>() {
                    Ok(speed) if speed > 0.0 && speed <= 4.0 => Ok(TransportCommand::Speed(speed)),
                    _ => Err(ParseError::InvalidArgument {
                        argument: "speed".to_string(),
                        value: value.to_string(),
                        expected: "a factor in (0, 4]".to_string(),
                    }),
                }
            }
            "devices" => Ok(TransportCommand::Devices),
            "volume" => {
                let device = Self::required_number(&args, 1, "volume", "device")?;
                let level_str = args.get(2).ok_or_else(|| ParseError::MissingArgument {
                    command: "volume".to_string(),
                    argument: "level".to_string(),
                })?;
                let level = level_str.parse::<u16>().map_err(|_| ParseError::InvalidArgument {
                    argument: "volume level".to_string(),
                    value: level_str.to_string(),
                    expected: "0-65535".to_string(),
                })?;
                Ok(TransportCommand::Volume { device, level })
            }
            "spectrum" => Ok(TransportCommand::Spectrum),
            "status" => Ok(TransportCommand::Status),
            "quit" | "exit" | "q" => Ok(TransportCommand::Quit),
            "help" => Err(ParseError::HelpRequested),
            _ => Err(ParseError::UnknownCommand {
                command: name.to_string(),
            }),
        }
    }

    fn required_number(
        args: &[&str],
        index: usize,
        command: &str,
        argument: &str,
    ) -> Result<usize, ParseError> {
        let value = args.get(index).ok_or_else(|| ParseError::MissingArgument {
            command: command.to_string(),
            argument: argument.to_string(),
        })?;
        Self::parse_number(value, argument)
    }

    /// 1-based index; zero is rejected
    fn parse_number(value: &str, argument: &str) -> Result<usize, ParseError> {
        match value.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ParseError::InvalidArgument {
                argument: argument.to_string(),
                value: value.to_string(),
                expected: "a number starting at 1".to_string(),
            }),
        }
    }

    fn optional_switch(value: Option<&&str>, argument: &str) -> Result<Option<bool>, ParseError> {
        match value {
            None => Ok(None),
            Some(&"on") => Ok(Some(true)),
            Some(&"off") => Ok(Some(false)),
            Some(other) => Err(ParseError::InvalidArgument {
                argument: argument.to_string(),
                value: other.to_string(),
                expected: "on or off".to_string(),
            }),
        }
    }

    /// Display help information
    pub fn display_help() {
        println!("chipdeck - interactive commands:");
        println!();
        println!("Transport:");
        println!("  pause / resume       - Pause or resume playback");
        println!("  stop                 - Stop and release the decoder");
        println!("  next / prev          - Skip to the next or previous track");
        println!("  play <game> [track]  - Jump to a game and track");
        println!("  seek <time>          - Seek to position (e.g., '1:30', '90s')");
        println!();
        println!("Modes:");
        println!("  loop [off|track|game]     - Set or cycle the loop mode");
        println!("  shuffle [off|game|all]    - Set or cycle the shuffle mode");
        println!("  favorites [on|off]        - Restrict shuffle to favorites");
        println!("  endless [on|off]          - Loop the current track forever");
        println!("  speed <factor>            - Playback speed");
        println!();
        println!("Information:");
        println!("  status               - Show the player status");
        println!("  spectrum             - Show the spectrum of recent output");
        println!("  devices              - List the sound chips of the current track");
        println!("  volume <dev> <level> - Set a chip's mixer volume");
        println!("  fav                  - Toggle the playing track's favorite flag");
        println!();
        println!("  help                 - Show this help message");
        println!("  quit                 - Exit the player");
    }

    /// Parse time string to Duration
    pub fn parse_time(time_str: &str) -> Result<Duration, ParseError> {
        let trimmed = time_str.trim();
        let invalid = || ParseError::InvalidTimeFormat {
            input: time_str.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        // "1:30", "1:30.5", "90", "90s"
        let seconds = match trimmed.split_once(':') {
            Some((minutes, seconds)) => {
                let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
                let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
                if !(0.0..60.0).contains(&seconds) {
                    return Err(invalid());
                }
                minutes as f64 * 60.0 + seconds
            }
            None => {
                let seconds: f64 = trimmed.trim_end_matches('s').parse().map_err(|_| invalid())?;
                if seconds < 0.0 || !seconds.is_finite() {
                    return Err(invalid());
                }
                seconds
            }
        };

        Ok(Duration::from_secs_f64(seconds))
    }
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },

    #[error("Help requested")]
    HelpRequested,
}
