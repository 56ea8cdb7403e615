//! Archive import: extract, group into games, read tags and persist.

pub mod extract;
pub mod playlist;
pub mod sidecar;

use crate::engine::{EngineFactory, EngineSession};
use crate::error::ImportError;
use crate::format::{classify, classify_path, ArchiveKind, FormatKind};
use crate::library::LibraryStore;
use crate::models::{Game, NewGame, NewTrack, TagSet, UNKNOWN_DURATION};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use playlist::{load_m3u, order_by_playlist, sort_by_file_name};
use sidecar::{parse_gameinfo, parse_trackinfo, GameInfo, TrackInfo};

const ART_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Files of an extracted archive, sorted into roles
#[derive(Debug, Default)]
struct ArchiveContents {
    audio: Vec<PathBuf>,
    containers: Vec<PathBuf>,
    playlists: Vec<PathBuf>,
    game_infos: Vec<PathBuf>,
    track_infos: Vec<PathBuf>,
    art: Vec<PathBuf>,
}

impl ArchiveContents {
    fn scan(files: Vec<PathBuf>) -> Self {
        let mut contents = Self::default();
        for file in files {
            let ext = extension_of(&file);
            match classify_path(&file) {
                FormatKind::Msx => contents.containers.push(file),
                kind if kind.is_playable() => contents.audio.push(file),
                _ => match ext.as_str() {
                    "m3u" | "m3u8" => contents.playlists.push(file),
                    "gameinfo" => contents.game_infos.push(file),
                    "trackinfo" => contents.track_infos.push(file),
                    e if ART_EXTENSIONS.contains(&e) => contents.art.push(file),
                    _ => {}
                },
            }
        }
        contents
    }

    fn has_audio(&self) -> bool {
        !self.audio.is_empty() || !self.containers.is_empty()
    }

    /// Sidecar sitting next to `container` with the same stem
    fn sidecar_for<'a>(sidecars: &'a [PathBuf], container: &Path) -> Option<&'a PathBuf> {
        let stem = stem_lowercase(container);
        sidecars
            .iter()
            .find(|s| s.parent() == container.parent() && stem_lowercase(s) == stem)
    }
}

/// Temporary copy of the incoming archive, removed when dropped
struct StagedArchive(PathBuf);

impl Drop for StagedArchive {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Could not remove staged archive {}: {}", self.0.display(), e);
            }
        }
    }
}

/// Turns downloaded archives into library games
pub struct ArchiveImporter {
    store: Arc<dyn LibraryStore>,
    engines: EngineFactory,
    library_dir: PathBuf,
}

impl ArchiveImporter {
    pub fn new(store: Arc<dyn LibraryStore>, engines: EngineFactory, library_dir: PathBuf) -> Self {
        Self {
            store,
            engines,
            library_dir,
        }
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// Import an archive file from disk
    pub fn import_file(&self, path: &Path) -> Result<Vec<Game>, ImportError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        self.import(File::open(path)?, &name)
    }

    /// Import an archive stream named `archive_name`.
    ///
    /// Returns the games created or reused; an archive without playable
    /// audio yields an empty list and leaves nothing behind.
    pub fn import<R: Read>(&self, mut reader: R, archive_name: &str) -> Result<Vec<Game>, ImportError> {
        fs::create_dir_all(&self.library_dir)?;
        // Game identity is a path, so every spelling of the folder must agree
        let library_dir = fs::canonicalize(&self.library_dir)?;

        let folder = sanitize_folder_name(archive_name);
        let staged = StagedArchive(library_dir.join(format!(".{}.incoming", folder)));
        {
            let mut out = File::create(&staged.0)?;
            io::copy(&mut reader, &mut out)?;
        }

        let kind = match extract::sniff_file(&staged.0)? {
            Some(kind) => kind,
            None => match classify(archive_name) {
                FormatKind::Archive(kind) => kind,
                _ => {
                    return Err(ImportError::UnknownArchive {
                        name: archive_name.to_string(),
                    })
                }
            },
        };

        let work_dir = library_dir.join(&folder);
        let fresh = !work_dir.exists();
        let result = self.import_extracted(kind, &staged.0, &work_dir, archive_name);

        match &result {
            Ok(games) if games.is_empty() && fresh => remove_dir(&work_dir),
            Err(_) if fresh => remove_dir(&work_dir),
            _ => {}
        }
        result
    }

    fn import_extracted(
        &self,
        kind: ArchiveKind,
        archive: &Path,
        work_dir: &Path,
        archive_name: &str,
    ) -> Result<Vec<Game>, ImportError> {
        extract::extract(kind, archive, work_dir)?;
        self.extract_nested(work_dir)?;

        let contents = ArchiveContents::scan(extract::walk_files(work_dir)?);
        if !contents.has_audio() {
            log::info!("{} contains no playable audio", archive_name);
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        match self.import_games(&contents, work_dir, archive_name, &mut created) {
            Ok(games) => {
                log::info!("Imported {} game(s) from {}", games.len(), archive_name);
                Ok(games)
            }
            Err(e) => {
                self.roll_back(&created);
                Err(e)
            }
        }
    }

    /// Build every game of the archive, recording the ids of new rows in `created`
    fn import_games(
        &self,
        contents: &ArchiveContents,
        work_dir: &Path,
        archive_name: &str,
        created: &mut Vec<i64>,
    ) -> Result<Vec<Game>, ImportError> {
        let art = contents.art.first().cloned();
        let mut games = Vec::new();

        for container in &contents.containers {
            let game_info = ArchiveContents::sidecar_for(&contents.game_infos, container)
                .and_then(|p| read_lossy(p))
                .map(|text| parse_gameinfo(&text));
            let track_info = ArchiveContents::sidecar_for(&contents.track_infos, container)
                .and_then(|p| read_lossy(p))
                .map(|text| parse_trackinfo(&text));

            match self.import_container(
                container,
                game_info,
                track_info,
                art.clone(),
                archive_name,
                created,
            ) {
                Ok(Some(game)) => games.push(game),
                Ok(None) => {}
                Err(ImportError::Library(e)) => return Err(e.into()),
                Err(e) => log::warn!("Skipping {}: {}", container.display(), e),
            }
        }

        if !contents.audio.is_empty() {
            if let Some(game) = self.import_standard(work_dir, contents, art, archive_name, created)? {
                games.push(game);
            }
        }
        Ok(games)
    }

    /// Remove the rows a failed import created; reused games are left alone
    fn roll_back(&self, created: &[i64]) {
        for &game_id in created.iter().rev() {
            match self.store.delete_game(game_id) {
                Ok(()) => log::debug!("Rolled back game {}", game_id),
                Err(e) => log::error!("Could not remove partial game {}: {}", game_id, e),
            }
        }
    }

    /// Unpack RAR-family archives found inside the archive, one level deep
    fn extract_nested(&self, work_dir: &Path) -> Result<(), ImportError> {
        for file in extract::walk_files(work_dir)? {
            if classify_path(&file) != FormatKind::Archive(ArchiveKind::Rar) {
                continue;
            }
            let dest = file.with_extension("");
            log::debug!("Extracting nested archive {}", file.display());
            match extract::extract(ArchiveKind::Rar, &file, &dest) {
                Ok(_) => fs::remove_file(&file)?,
                Err(e) => log::warn!("Could not extract nested {}: {}", file.display(), e),
            }
        }
        Ok(())
    }

    /// Existing game at `path` that already has tracks
    fn existing_game(&self, path: &str) -> Result<Option<Game>, ImportError> {
        if let Some(game) = self.store.find_game_by_path(path)? {
            if !self.store.get_tracks_for_game(game.id)?.is_empty() {
                log::info!("{} is already in the library", game.display_name());
                return Ok(Some(game));
            }
        }
        Ok(None)
    }

    /// All loose audio files of the archive as one game
    fn import_standard(
        &self,
        work_dir: &Path,
        contents: &ArchiveContents,
        art: Option<PathBuf>,
        archive_name: &str,
        created: &mut Vec<i64>,
    ) -> Result<Option<Game>, ImportError> {
        let game_path = work_dir.to_string_lossy().into_owned();
        if let Some(game) = self.existing_game(&game_path)? {
            return Ok(Some(game));
        }

        let ordered = match contents.playlists.first() {
            Some(m3u) => match load_m3u(m3u) {
                Ok(entries) => order_by_playlist(&contents.audio, &entries),
                Err(e) => {
                    log::warn!("Ignoring unreadable playlist {}: {}", m3u.display(), e);
                    by_name(&contents.audio)
                }
            },
            None => by_name(&contents.audio),
        };

        let mut tags = TagSet::default();
        let mut chips = Vec::new();
        let mut tracks = Vec::with_capacity(ordered.len());

        for (ordinal, (path, title)) in ordered.into_iter().enumerate() {
            let duration_samples = match self.engines.open_session(&path, None) {
                Ok(session) => {
                    if ordinal == 0 {
                        tags = session.tags().clone();
                        chips = device_names(&session);
                    }
                    session.duration_samples()
                }
                Err(e) => {
                    log::warn!("Could not read {}: {}", path.display(), e);
                    UNKNOWN_DURATION
                }
            };

            let title = title.unwrap_or_else(|| file_stem(&path));
            tracks.push(NewTrack {
                title,
                path,
                ordinal,
                duration_samples,
                sub_track: None,
            });
        }

        let game = NewGame {
            path: game_path,
            name: non_empty(tags.game.best()).unwrap_or_else(|| archive_stem(archive_name)),
            system: tags.system.best().to_string(),
            author: tags.author.best().to_string(),
            year: tags.year(),
            chips,
            art_path: art,
            source_archive: archive_name.to_string(),
        };

        self.persist(&game, &tracks, created).map(Some)
    }

    /// One game per MSX container, curated by sidecars when present
    fn import_container(
        &self,
        container: &Path,
        game_info: Option<GameInfo>,
        track_info: Option<HashMap<usize, TrackInfo>>,
        art: Option<PathBuf>,
        archive_name: &str,
        created: &mut Vec<i64>,
    ) -> Result<Option<Game>, ImportError> {
        let game_path = container.to_string_lossy().into_owned();
        if let Some(game) = self.existing_game(&game_path)? {
            return Ok(Some(game));
        }

        let mut session = self.engines.open_session(container, None)?;
        let range = session.sub_track_range();
        let tags = session.tags().clone();
        let chips = device_names(&session);
        let game_info = game_info.unwrap_or_default();
        let track_info = track_info.unwrap_or_default();

        let sub_tracks: Vec<usize> = match &game_info.tracks_to_play {
            Some(list) => list
                .iter()
                .copied()
                .filter(|index| {
                    let valid = range.contains(index);
                    if !valid {
                        log::warn!(
                            "{}: sub-track {} is outside {}..{}",
                            container.display(),
                            index,
                            range.start,
                            range.end
                        );
                    }
                    valid
                })
                .collect(),
            None => range.clone().collect(),
        };

        let mut tracks = Vec::with_capacity(sub_tracks.len());
        for (ordinal, sub_track) in sub_tracks.into_iter().enumerate() {
            let curated = track_info.get(&sub_track);

            let title = curated
                .and_then(|info| non_empty(&info.title))
                .unwrap_or_else(|| format!("Track {}", sub_track));

            let curated_samples = curated
                .filter(|info| !info.duration.is_zero())
                .map(|info| {
                    self.engines
                        .policy()
                        .resolve_curated(info.duration, info.loop_point, info.repeat)
                });
            let duration_samples = match curated_samples {
                Some(samples) => samples,
                None => match session.select_sub_track(sub_track) {
                    Ok(()) => session.duration_samples(),
                    Err(e) => {
                        log::warn!("Could not read sub-track {}: {}", sub_track, e);
                        UNKNOWN_DURATION
                    }
                },
            };

            tracks.push(NewTrack {
                title,
                path: container.to_path_buf(),
                ordinal,
                duration_samples,
                sub_track: Some(sub_track),
            });
        }
        session.close();

        if tracks.is_empty() {
            log::warn!("{} exposes no sub-tracks", container.display());
            return Ok(None);
        }

        let game = NewGame {
            path: game_path,
            name: non_empty(tags.game.best())
                .or_else(|| non_empty(tags.title.best()))
                .unwrap_or_else(|| file_stem(container)),
            system: non_empty(tags.system.best()).unwrap_or_else(|| "MSX".to_string()),
            author: non_empty(&game_info.vendor)
                .unwrap_or_else(|| tags.author.best().to_string()),
            year: non_empty(&game_info.year).unwrap_or_else(|| tags.year()),
            chips,
            art_path: art,
            source_archive: archive_name.to_string(),
        };

        self.persist(&game, &tracks, created).map(Some)
    }

    /// Insert the game and its tracks, noting the id when the row is new
    fn persist(
        &self,
        game: &NewGame,
        tracks: &[NewTrack],
        created: &mut Vec<i64>,
    ) -> Result<Game, ImportError> {
        let existed = self.store.find_game_by_path(&game.path)?.is_some();
        let game_id = self.store.insert_or_replace_game(game)?;
        if !existed {
            created.push(game_id);
        }
        self.store.insert_tracks(game_id, tracks)?;
        Ok(self.store.get_game(game_id)?)
    }
}

fn device_names(session: &EngineSession) -> Vec<String> {
    (0..session.device_count())
        .filter_map(|i| session.device_name(i))
        .filter(|name| !name.is_empty())
        .collect()
}

fn by_name(files: &[PathBuf]) -> Vec<(PathBuf, Option<String>)> {
    let mut sorted = files.to_vec();
    sort_by_file_name(&mut sorted);
    sorted.into_iter().map(|p| (p, None)).collect()
}

fn read_lossy(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            log::warn!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

fn remove_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        log::warn!("Could not remove {}: {}", dir.display(), e);
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn stem_lowercase(path: &Path) -> String {
    file_stem(path).to_lowercase()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn archive_stem(archive_name: &str) -> String {
    file_stem(Path::new(archive_name))
}

/// Folder name for an archive: its stem with path-hostile characters replaced
fn sanitize_folder_name(archive_name: &str) -> String {
    let cleaned: String = archive_stem(archive_name)
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').to_string();
    if cleaned.is_empty() {
        "archive".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_folder_name() {
        assert_eq!(sanitize_folder_name("Sonic (1991).zip"), "Sonic (1991)");
        assert_eq!(sanitize_folder_name("a/b:c*d.rar"), "a_b_c_d");
        assert_eq!(sanitize_folder_name("...zip"), "archive");
        assert_eq!(sanitize_folder_name(""), "archive");
    }

    #[test]
    fn test_scan_sorts_roles() {
        let files = [
            "g/01.vgz",
            "g/game.kss",
            "g/game.gameinfo",
            "g/game.trackinfo",
            "g/game.m3u",
            "g/cover.PNG",
            "g/readme.txt",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        let contents = ArchiveContents::scan(files);

        assert_eq!(contents.audio, vec![PathBuf::from("g/01.vgz")]);
        assert_eq!(contents.containers, vec![PathBuf::from("g/game.kss")]);
        assert_eq!(contents.playlists.len(), 1);
        assert_eq!(contents.art, vec![PathBuf::from("g/cover.PNG")]);
        assert!(contents.has_audio());

        let container = PathBuf::from("g/GAME.kss");
        assert_eq!(
            ArchiveContents::sidecar_for(&contents.game_infos, &container),
            Some(&PathBuf::from("g/game.gameinfo"))
        );
        assert!(ArchiveContents::sidecar_for(&contents.game_infos, Path::new("h/game.kss")).is_none());
    }
}
