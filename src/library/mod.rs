//! Persistent game/track catalog.

pub mod sqlite;

use crate::error::LibraryError;
use crate::models::{Game, NewGame, NewTrack, Track};

pub use sqlite::SqliteLibrary;

/// Which row a favorite toggle applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteTarget {
    Game(i64),
    Track(i64),
}

/// Catalog persistence consumed by the importer and the player
pub trait LibraryStore: Send + Sync {
    /// Insert a game, or refresh the row with the same path; returns its id.
    /// The favorite flag of an existing row is kept.
    fn insert_or_replace_game(&self, game: &NewGame) -> Result<i64, LibraryError>;

    fn find_game_by_path(&self, path: &str) -> Result<Option<Game>, LibraryError>;

    fn get_game(&self, id: i64) -> Result<Game, LibraryError>;

    /// Insert all tracks of a game atomically
    fn insert_tracks(&self, game_id: i64, tracks: &[NewTrack]) -> Result<Vec<Track>, LibraryError>;

    /// Tracks of a game in ordinal order
    fn get_tracks_for_game(&self, game_id: i64) -> Result<Vec<Track>, LibraryError>;

    fn list_games(&self) -> Result<Vec<Game>, LibraryError>;

    fn update_favorite(&self, target: FavoriteTarget, favorite: bool) -> Result<(), LibraryError>;

    /// Remove a game together with its tracks
    fn delete_game(&self, game_id: i64) -> Result<(), LibraryError>;
}

/// A game with its tracks, as the player sees it
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogGame {
    pub game: Game,
    pub tracks: Vec<Track>,
}

/// In-memory snapshot of the library used for navigation and shuffle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub games: Vec<CatalogGame>,
}

impl Catalog {
    pub fn new(games: Vec<CatalogGame>) -> Self {
        Self { games }
    }

    pub fn load(store: &dyn LibraryStore) -> Result<Self, LibraryError> {
        let mut games = Vec::new();
        for game in store.list_games()? {
            let tracks = store.get_tracks_for_game(game.id)?;
            games.push(CatalogGame { game, tracks });
        }
        Ok(Self { games })
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Total number of tracks across all games
    pub fn track_count(&self) -> usize {
        self.games.iter().map(|g| g.tracks.len()).sum()
    }

    pub fn game(&self, index: usize) -> Option<&CatalogGame> {
        self.games.get(index)
    }

    pub fn track(&self, game: usize, track: usize) -> Option<&Track> {
        self.games.get(game).and_then(|g| g.tracks.get(track))
    }

    pub fn game_index(&self, game_id: i64) -> Option<usize> {
        self.games.iter().position(|g| g.game.id == game_id)
    }

    /// Locate a track by id as (game index, track index)
    pub fn find_track(&self, track_id: i64) -> Option<(usize, usize)> {
        self.games.iter().enumerate().find_map(|(gi, g)| {
            g.tracks
                .iter()
                .position(|t| t.id == track_id)
                .map(|ti| (gi, ti))
        })
    }

    pub fn apply_favorite(&mut self, target: FavoriteTarget, favorite: bool) {
        match target {
            FavoriteTarget::Game(id) => {
                if let Some(index) = self.game_index(id) {
                    self.games[index].game.favorite = favorite;
                }
            }
            FavoriteTarget::Track(id) => {
                if let Some((gi, ti)) = self.find_track(id) {
                    self.games[gi].tracks[ti].favorite = favorite;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::default();
        for game_id in 1..=2i64 {
            let game = Game {
                id: game_id,
                path: format!("/lib/game{}", game_id),
                name: format!("Game {}", game_id),
                system: String::new(),
                author: String::new(),
                year: String::new(),
                chips: Vec::new(),
                art_path: None,
                favorite: false,
                source_archive: String::new(),
            };
            let tracks = (0..3)
                .map(|ordinal| Track {
                    id: game_id * 10 + ordinal as i64,
                    game_id,
                    title: format!("Track {}", ordinal),
                    path: format!("/lib/game{}/{}.vgm", game_id, ordinal).into(),
                    ordinal,
                    duration_samples: -1,
                    favorite: false,
                    sub_track: None,
                })
                .collect();
            catalog.games.push(CatalogGame { game, tracks });
        }
        catalog
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = sample_catalog();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.track_count(), 6);
        assert_eq!(catalog.game_index(2), Some(1));
        assert_eq!(catalog.find_track(21), Some((1, 1)));
        assert_eq!(catalog.find_track(99), None);
        assert_eq!(catalog.track(0, 2).map(|t| t.id), Some(12));
        assert!(catalog.track(0, 3).is_none());
    }

    #[test]
    fn test_apply_favorite() {
        let mut catalog = sample_catalog();

        catalog.apply_favorite(FavoriteTarget::Track(12), true);
        catalog.apply_favorite(FavoriteTarget::Game(2), true);

        assert!(catalog.games[0].tracks[2].favorite);
        assert!(catalog.games[1].game.favorite);
        assert!(!catalog.games[0].game.favorite);
    }
}
