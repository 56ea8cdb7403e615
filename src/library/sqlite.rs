use super::{FavoriteTarget, LibraryStore};
use crate::error::LibraryError;
use crate::models::{Game, NewGame, NewTrack, Track};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const GAME_COLUMNS: &str =
    "id, path, name, system, author, year, chips, art_path, favorite, source_archive";

const TRACK_COLUMNS: &str =
    "id, game_id, title, path, ordinal, duration_samples, favorite, sub_track";

/// SQLite-backed library
pub struct SqliteLibrary {
    conn: Mutex<Connection>,
}

impl SqliteLibrary {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LibraryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LibraryError> {
        let library = Self {
            conn: Mutex::new(conn),
        };
        library.initialize_schema()?;
        Ok(library)
    }

    fn initialize_schema(&self) -> Result<(), LibraryError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                system TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                year TEXT NOT NULL DEFAULT '',
                chips TEXT NOT NULL DEFAULT '',
                art_path TEXT,
                favorite INTEGER NOT NULL DEFAULT 0,
                source_archive TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
                title TEXT NOT NULL DEFAULT '',
                path TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                duration_samples INTEGER NOT NULL DEFAULT -1,
                favorite INTEGER NOT NULL DEFAULT 0,
                sub_track INTEGER,
                UNIQUE(game_id, ordinal)
            );
            CREATE INDEX IF NOT EXISTS idx_tracks_game ON tracks(game_id);",
        )?;
        Ok(())
    }

    fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
        let chips: String = row.get(6)?;
        Ok(Game {
            id: row.get(0)?,
            path: row.get(1)?,
            name: row.get(2)?,
            system: row.get(3)?,
            author: row.get(4)?,
            year: row.get(5)?,
            chips: split_chips(&chips),
            art_path: row.get::<_, Option<String>>(7)?.map(PathBuf::from),
            favorite: row.get(8)?,
            source_archive: row.get(9)?,
        })
    }

    fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
        Ok(Track {
            id: row.get(0)?,
            game_id: row.get(1)?,
            title: row.get(2)?,
            path: PathBuf::from(row.get::<_, String>(3)?),
            ordinal: row.get::<_, i64>(4)? as usize,
            duration_samples: row.get(5)?,
            favorite: row.get(6)?,
            sub_track: row.get::<_, Option<i64>>(7)?.map(|s| s as usize),
        })
    }
}

fn split_chips(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl LibraryStore for SqliteLibrary {
    fn insert_or_replace_game(&self, game: &NewGame) -> Result<i64, LibraryError> {
        let conn = self.conn.lock();
        let id = conn.query_row(
            "INSERT INTO games (path, name, system, author, year, chips, art_path, source_archive)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                system = excluded.system,
                author = excluded.author,
                year = excluded.year,
                chips = excluded.chips,
                art_path = excluded.art_path,
                source_archive = excluded.source_archive
             RETURNING id",
            params![
                game.path,
                game.name,
                game.system,
                game.author,
                game.year,
                game.chips.join(","),
                game.art_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                game.source_archive,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn find_game_by_path(&self, path: &str) -> Result<Option<Game>, LibraryError> {
        let conn = self.conn.lock();
        let game = conn
            .query_row(
                &format!("SELECT {} FROM games WHERE path = ?1", GAME_COLUMNS),
                params![path],
                Self::game_from_row,
            )
            .optional()?;
        Ok(game)
    }

    fn get_game(&self, id: i64) -> Result<Game, LibraryError> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS),
            params![id],
            Self::game_from_row,
        )
        .optional()?
        .ok_or(LibraryError::GameNotFound { id })
    }

    fn insert_tracks(&self, game_id: i64, tracks: &[NewTrack]) -> Result<Vec<Track>, LibraryError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = Vec::with_capacity(tracks.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO tracks (game_id, title, path, ordinal, duration_samples, sub_track)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for track in tracks {
                stmt.execute(params![
                    game_id,
                    track.title,
                    track.path.to_string_lossy().into_owned(),
                    track.ordinal as i64,
                    track.duration_samples,
                    track.sub_track.map(|s| s as i64),
                ])?;
                inserted.push(Track {
                    id: tx.last_insert_rowid(),
                    game_id,
                    title: track.title.clone(),
                    path: track.path.clone(),
                    ordinal: track.ordinal,
                    duration_samples: track.duration_samples,
                    favorite: false,
                    sub_track: track.sub_track,
                });
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn get_tracks_for_game(&self, game_id: i64) -> Result<Vec<Track>, LibraryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracks WHERE game_id = ?1 ORDER BY ordinal ASC",
            TRACK_COLUMNS
        ))?;
        let track_iter = stmt.query_map(params![game_id], Self::track_from_row)?;

        let mut tracks = Vec::new();
        for track in track_iter {
            tracks.push(track?);
        }
        Ok(tracks)
    }

    fn list_games(&self) -> Result<Vec<Game>, LibraryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM games ORDER BY name COLLATE NOCASE ASC, id ASC",
            GAME_COLUMNS
        ))?;
        let game_iter = stmt.query_map([], Self::game_from_row)?;

        let mut games = Vec::new();
        for game in game_iter {
            games.push(game?);
        }
        Ok(games)
    }

    fn update_favorite(&self, target: FavoriteTarget, favorite: bool) -> Result<(), LibraryError> {
        let conn = self.conn.lock();
        let (sql, id) = match target {
            FavoriteTarget::Game(id) => ("UPDATE games SET favorite = ?1 WHERE id = ?2", id),
            FavoriteTarget::Track(id) => ("UPDATE tracks SET favorite = ?1 WHERE id = ?2", id),
        };
        let changed = conn.execute(sql, params![favorite, id])?;
        if changed == 0 {
            return Err(match target {
                FavoriteTarget::Game(id) => LibraryError::GameNotFound { id },
                FavoriteTarget::Track(id) => LibraryError::TrackNotFound { id },
            });
        }
        Ok(())
    }

    fn delete_game(&self, game_id: i64) -> Result<(), LibraryError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM games WHERE id = ?1", params![game_id])?;
        Ok(())
    }
}
