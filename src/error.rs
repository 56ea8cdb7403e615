use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Command error: {0}")]
    Parse(#[from] crate::cli::ParseError),
}

impl PlayerError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Engine(err) => err.user_message(),
            PlayerError::Import(err) => err.user_message(),
            PlayerError::Library(err) => err.user_message(),
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::Playback(err) => err.user_message(),
            PlayerError::Parse(err) => format!("Command error: {}", err),
        }
    }

    /// Check if this error allows the session to carry on
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Engine(err) => err.is_recoverable(),
            PlayerError::Import(err) => err.is_recoverable(),
            PlayerError::Library(_) => false,
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
            PlayerError::Config(_) => true,
            PlayerError::Playback(_) => true,
            PlayerError::Parse(_) => true,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Engine(EngineError::UnsupportedFormat { .. }) => ErrorSeverity::Warning,
            PlayerError::Engine(_) => ErrorSeverity::Error,
            PlayerError::Import(ImportError::UnknownArchive { .. }) => ErrorSeverity::Warning,
            PlayerError::Import(_) => ErrorSeverity::Error,
            PlayerError::Library(_) => ErrorSeverity::Critical,
            PlayerError::Audio(AudioError::BufferOverrun) => ErrorSeverity::Warning,
            PlayerError::Audio(_) => ErrorSeverity::Critical,
            PlayerError::File(_) => ErrorSeverity::Error,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::Playback(_) => ErrorSeverity::Info,
            PlayerError::Parse(_) => ErrorSeverity::Info,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::InvalidData => "File contains invalid or corrupted data".to_string(),
            std::io::ErrorKind::UnexpectedEof => "File appears to be truncated or corrupted".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Errors raised while opening or driving a decoding engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unsupported format: {file}")]
    UnsupportedFormat { file: String },

    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Decoder rejected {path}: {reason}")]
    Rejected { path: String, reason: String },

    #[error("No {engine} decoder is available")]
    EngineUnavailable { engine: &'static str },

    #[error("Sub-track {index} is outside the valid range {first}..{end}")]
    SubTrackOutOfRange { index: usize, first: usize, end: usize },

    #[error("No session is open")]
    NotOpen,
}

impl EngineError {
    pub fn user_message(&self) -> String {
        match self {
            EngineError::UnsupportedFormat { file } => {
                format!("'{}' is not a format this player understands", file)
            }
            EngineError::Unreadable { path, .. } => {
                format!("Cannot read '{}' - it may have been moved or deleted", path)
            }
            EngineError::Rejected { path, reason } => {
                format!("The decoder could not load '{}': {}", path, reason)
            }
            EngineError::EngineUnavailable { engine } => {
                format!("This build has no {} decoder linked in", engine)
            }
            EngineError::SubTrackOutOfRange { index, .. } => {
                format!("Song {} does not exist in this file", index)
            }
            EngineError::NotOpen => "Nothing is loaded".to_string(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::UnsupportedFormat { .. } => false,
            EngineError::Unreadable { .. } => false,
            EngineError::Rejected { .. } => true, // Next track may still play
            EngineError::EngineUnavailable { .. } => false,
            EngineError::SubTrackOutOfRange { .. } => true,
            EngineError::NotOpen => true,
        }
    }
}

/// Archive import errors
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unknown archive type: {name}")]
    UnknownArchive { name: String },

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("RAR error: {0}")]
    Rar(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

impl ImportError {
    pub fn user_message(&self) -> String {
        match self {
            ImportError::UnknownArchive { name } => {
                format!("'{}' is neither a ZIP nor a RAR archive", name)
            }
            ImportError::Zip(err) => format!("The ZIP archive could not be read: {}", err),
            ImportError::Rar(msg) => format!("The RAR archive could not be read: {}", msg),
            ImportError::Engine(err) => err.user_message(),
            ImportError::Io(err) => format!("Could not write extracted files: {}", err),
            ImportError::Library(err) => err.user_message(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            ImportError::UnknownArchive { .. } => false,
            ImportError::Zip(_) | ImportError::Rar(_) => false,
            ImportError::Engine(_) => true,
            ImportError::Io(_) => true, // Disk space may free up
            ImportError::Library(_) => false,
        }
    }
}

/// Library (catalog store) errors
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Game {id} not found")]
    GameNotFound { id: i64 },

    #[error("Track {id} not found")]
    TrackNotFound { id: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LibraryError {
    pub fn user_message(&self) -> String {
        match self {
            LibraryError::Database(err) => format!("The music library database failed: {}", err),
            LibraryError::GameNotFound { id } => format!("There is no game with id {}", id),
            LibraryError::TrackNotFound { id } => format!("There is no track with id {}", id),
            LibraryError::Io(err) => format!("Cannot access the library directory: {}", err),
        }
    }
}

/// Audio output errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No output device available")]
    NoDevice,

    #[error("Unsupported sample format: {format}")]
    UnsupportedSampleFormat { format: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Output buffer overrun")]
    BufferOverrun,

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::NoDevice => "No audio output device is available".to_string(),
            AudioError::UnsupportedSampleFormat { format } => {
                format!("The output device wants {} samples, which is not supported", format)
            }
            AudioError::StreamError(msg) => format!("Audio playback interrupted: {}", msg),
            AudioError::BufferOverrun => {
                "Audio output is not draining - some audio was dropped".to_string()
            }
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio system: {}", msg)
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::NoDevice => false,
            AudioError::UnsupportedSampleFormat { .. } => false,
            AudioError::StreamError(_) => true,
            AudioError::BufferOverrun => true,
            AudioError::InitializationFailed(_) => true,
        }
    }
}

/// Transport-level errors from the playback orchestrator
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Invalid game index: {index}")]
    InvalidGame { index: usize },

    #[error("Invalid track index {track} for game {game}")]
    InvalidTrack { game: usize, track: usize },

    #[error("Library is empty")]
    EmptyLibrary,

    #[error("Nothing is playing")]
    NotPlaying,

    #[error("Render thread failed to start: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("Open failed: {0}")]
    OpenFailed(#[from] EngineError),
}

impl PlaybackError {
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::InvalidGame { index } => {
                format!("Game number {} is not in the library", index + 1)
            }
            PlaybackError::InvalidTrack { game, track } => {
                format!("Track number {} is not part of game {}", track + 1, game + 1)
            }
            PlaybackError::EmptyLibrary => "The library is empty - import an archive first".to_string(),
            PlaybackError::NotPlaying => "Nothing is playing right now".to_string(),
            PlaybackError::WorkerSpawn(err) => format!("Could not start playback: {}", err),
            PlaybackError::OpenFailed(err) => err.user_message(),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }
}
