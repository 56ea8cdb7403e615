//! Choosing the track that follows the current one.

use crate::library::Catalog;
use crate::models::{LoopMode, ShuffleMode};
use rand::Rng;

/// Shuffle weight of a favorited track relative to a plain one
pub const FAVORITE_WEIGHT: u32 = 3;

/// Position in the catalog as (game index, track index)
pub type Cursor = (usize, usize);

/// Why the orchestrator is moving on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    /// The track ended or finished fading out
    Natural,
    /// The user asked for the next track
    Manual,
}

/// Play modes that shape the advance decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceModes {
    pub loop_mode: LoopMode,
    pub shuffle_mode: ShuffleMode,
    pub favorites_only: bool,
}

/// Track to play after `current`, or `None` when the catalog has no tracks
pub fn next_cursor<R: Rng>(
    catalog: &Catalog,
    current: Cursor,
    modes: AdvanceModes,
    reason: AdvanceReason,
    rng: &mut R,
) -> Option<Cursor> {
    if catalog.track_count() == 0 {
        return None;
    }

    match modes.loop_mode {
        LoopMode::Track if reason == AdvanceReason::Natural && catalog.track(current.0, current.1).is_some() => {
            return Some(current)
        }
        LoopMode::Game => {
            if let Some(game) = catalog.game(current.0).filter(|g| !g.tracks.is_empty()) {
                return Some((current.0, (current.1 + 1) % game.tracks.len()));
            }
        }
        _ => {}
    }

    match modes.shuffle_mode {
        ShuffleMode::All => shuffle_all(catalog, current, modes.favorites_only, rng),
        ShuffleMode::Game => shuffle_game(catalog, current, rng),
        ShuffleMode::Off => sequential_next(catalog, current),
    }
}

/// Track before `current`, wrapping across games
pub fn previous_cursor(catalog: &Catalog, current: Cursor) -> Option<Cursor> {
    if catalog.track_count() == 0 {
        return None;
    }

    let (game, track) = current;
    if track > 0 && catalog.track(game, track - 1).is_some() {
        return Some((game, track - 1));
    }

    let games = catalog.len();
    (1..=games)
        .map(|step| (game + games - step % games) % games)
        .find_map(|gi| {
            let count = catalog.game(gi)?.tracks.len();
            (count > 0).then(|| (gi, count - 1))
        })
}

/// Next track in catalog order, skipping empty games and wrapping at the end
pub fn sequential_next(catalog: &Catalog, current: Cursor) -> Option<Cursor> {
    let (game, track) = current;
    if catalog.track(game, track + 1).is_some() {
        return Some((game, track + 1));
    }

    let games = catalog.len();
    (1..=games)
        .map(|step| (game + step) % games)
        .find(|&gi| catalog.game(gi).map(|g| !g.tracks.is_empty()).unwrap_or(false))
        .map(|gi| (gi, 0))
}

/// Candidate pool for whole-library shuffle.
///
/// In favorites-only mode the pool is every track of a favorited game, else
/// every favorited track, else (nothing favorited) the whole library.
fn shuffle_pool(catalog: &Catalog, favorites_only: bool) -> Vec<(Cursor, u32)> {
    let all = || {
        catalog.games.iter().enumerate().flat_map(|(gi, g)| {
            g.tracks.iter().enumerate().map(move |(ti, t)| {
                let weight = if t.favorite || g.game.favorite {
                    FAVORITE_WEIGHT
                } else {
                    1
                };
                ((gi, ti), weight, g.game.favorite, t.favorite)
            })
        })
    };

    if favorites_only {
        let from_games: Vec<_> = all()
            .filter(|(_, _, game_fav, _)| *game_fav)
            .map(|(c, w, _, _)| (c, w))
            .collect();
        if !from_games.is_empty() {
            return from_games;
        }

        let tracks: Vec<_> = all()
            .filter(|(_, _, _, track_fav)| *track_fav)
            .map(|(c, w, _, _)| (c, w))
            .collect();
        if !tracks.is_empty() {
            return tracks;
        }
        log::debug!("No favorites in the library, shuffling everything");
    }

    all().map(|(c, w, _, _)| (c, w)).collect()
}

fn shuffle_all<R: Rng>(
    catalog: &Catalog,
    current: Cursor,
    favorites_only: bool,
    rng: &mut R,
) -> Option<Cursor> {
    let pool = shuffle_pool(catalog, favorites_only);
    weighted_pick(&pool, current, rng)
}

fn shuffle_game<R: Rng>(catalog: &Catalog, current: Cursor, rng: &mut R) -> Option<Cursor> {
    let Some(game) = catalog.game(current.0).filter(|g| !g.tracks.is_empty()) else {
        return sequential_next(catalog, current);
    };

    let pool: Vec<(Cursor, u32)> = game
        .tracks
        .iter()
        .enumerate()
        .map(|(ti, t)| {
            let weight = if t.favorite { FAVORITE_WEIGHT } else { 1 };
            ((current.0, ti), weight)
        })
        .collect();
    weighted_pick(&pool, current, rng)
}

/// Weighted random choice, avoiding `current` when there is an alternative
fn weighted_pick<R: Rng>(
    pool: &[(Cursor, u32)],
    current: Cursor,
    rng: &mut R,
) -> Option<Cursor> {
    let candidates: Vec<&(Cursor, u32)> = if pool.len() > 1 {
        pool.iter().filter(|(c, _)| *c != current).collect()
    } else {
        pool.iter().collect()
    };

    let total: u32 = candidates.iter().map(|(_, w)| *w).sum();
    if total == 0 {
        return None;
    }

    let mut roll = rng.random_range(0..total);
    for (cursor, weight) in candidates {
        if roll < *weight {
            return Some(*cursor);
        }
        roll -= weight;
    }
    None
}
