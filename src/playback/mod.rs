//! Transport control and the render loop.
//!
//! Lock order is `control` -> `session` -> `transport` -> `catalog` -> `rng`.
//! The render thread never takes `control`, so a control operation may join
//! it while holding that lock.

pub mod advance;
pub mod fade;
pub mod position;

use crate::audio::AudioSink;
use crate::config::PlayerConfig;
use crate::engine::{EngineFactory, EngineSession};
use crate::error::{LibraryError, PlaybackError};
use crate::library::{Catalog, FavoriteTarget, LibraryStore};
use crate::logging::PlaybackLogger;
use crate::models::{LoopMode, PlaybackSnapshot, PlayerState, ShuffleMode, TagSet};
use crate::spectrum::SpectrumAnalyzer;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub use advance::{AdvanceModes, AdvanceReason, Cursor};
pub use fade::FadeEnvelope;
pub use position::PositionClock;

/// Consecutive empty buffers after which a track that never reports its end
/// is treated as finished
const STALL_LIMIT: u32 = 8;

/// Timing knobs of the render loop
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub buffer_frames: usize,
    pub fade_out: Duration,
    pub skip_fade: Duration,
    pub snapshot_interval: Duration,
    pub pause_poll: Duration,
    pub spectrum_size: usize,
    pub stall_limit: u32,
}

impl PlaybackSettings {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            buffer_frames: config.buffer_frames.max(1),
            fade_out: Duration::from_millis(config.fade_out_ms),
            skip_fade: Duration::from_millis(config.skip_fade_ms),
            snapshot_interval: Duration::from_millis(config.snapshot_interval_ms.max(1)),
            pause_poll: Duration::from_millis(config.pause_poll_ms.max(1)),
            spectrum_size: config.spectrum_size,
            stall_limit: STALL_LIMIT,
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default())
    }
}

/// Pending manual skip: fade out, then open `target`
#[derive(Debug, Clone, Copy)]
struct SkipFade {
    envelope: FadeEnvelope,
    target: Cursor,
}

#[derive(Debug)]
struct Transport {
    player_state: PlayerState,
    cursor: Option<Cursor>,
    game_name: String,
    track_title: String,
    tags: TagSet,
    modes: AdvanceModes,
    endless: bool,
    end_fade: Option<FadeEnvelope>,
    skip: Option<SkipFade>,
    clock: PositionClock,
    speed: f64,
    empty_fills: u32,
}

/// How a render step ended the current track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Natural,
    Skip(Cursor),
}

#[derive(Debug)]
enum Step {
    Rendered { frames: usize, finished: Option<Finish> },
    Paused,
    Stopped,
}

struct Shared {
    factory: EngineFactory,
    sink: Arc<dyn AudioSink>,
    spectrum: SpectrumAnalyzer,
    settings: PlaybackSettings,
    fade_out_frames: u64,
    skip_fade_frames: u64,
    /// The only path to the open backend
    session: Mutex<Option<EngineSession>>,
    transport: Mutex<Transport>,
    catalog: RwLock<Catalog>,
    rng: Mutex<StdRng>,
    snapshots: watch::Sender<PlaybackSnapshot>,
    logger: PlaybackLogger,
}

struct Worker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the playback session and the render thread
pub struct PlaybackOrchestrator {
    shared: Arc<Shared>,
    control: Mutex<Option<Worker>>,
}

impl PlaybackOrchestrator {
    pub fn new(
        factory: EngineFactory,
        sink: Arc<dyn AudioSink>,
        settings: PlaybackSettings,
        catalog: Catalog,
    ) -> Self {
        let rate = factory.sample_rate() as u64;
        let to_frames = |d: Duration| (d.as_millis() as u64).saturating_mul(rate) / 1000;
        let (snapshots, _) = watch::channel(PlaybackSnapshot::default());

        let shared = Shared {
            fade_out_frames: to_frames(settings.fade_out),
            skip_fade_frames: to_frames(settings.skip_fade),
            spectrum: SpectrumAnalyzer::new(settings.spectrum_size),
            factory,
            sink,
            settings,
            session: Mutex::new(None),
            transport: Mutex::new(Transport {
                player_state: PlayerState::Idle,
                cursor: None,
                game_name: String::new(),
                track_title: String::new(),
                tags: TagSet::default(),
                modes: AdvanceModes::default(),
                endless: false,
                end_fade: None,
                skip: None,
                clock: PositionClock::new(),
                speed: 1.0,
                empty_fills: 0,
            }),
            catalog: RwLock::new(catalog),
            rng: Mutex::new(StdRng::from_os_rng()),
            snapshots,
            logger: PlaybackLogger::new(),
        };

        Self {
            shared: Arc::new(shared),
            control: Mutex::new(None),
        }
    }

    /// Make shuffle decisions reproducible
    pub fn reseed(&self, seed: u64) {
        *self.shared.rng.lock() = StdRng::seed_from_u64(seed);
    }

    pub fn logger(&self) -> &PlaybackLogger {
        &self.shared.logger
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.shared.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.shared.snapshot()
    }

    /// Tags of the playing track
    pub fn tags(&self) -> TagSet {
        self.shared.transport.lock().tags.clone()
    }

    pub fn spectrum(&self) -> Vec<f32> {
        self.shared.spectrum.spectrum()
    }

    pub fn catalog(&self) -> Catalog {
        self.shared.catalog.read().clone()
    }

    /// Replace the catalog, keeping the playing track selected if it survived
    pub fn set_catalog(&self, catalog: Catalog) {
        let _control = self.control.lock();
        let mut transport = self.shared.transport.lock();
        let mut current = self.shared.catalog.write();

        let playing_id = transport
            .cursor
            .and_then(|(g, t)| current.track(g, t))
            .map(|track| track.id);
        *current = catalog;
        transport.cursor = playing_id.and_then(|id| current.find_track(id));

        drop(current);
        drop(transport);
        self.shared.publish();
    }

    pub fn modes(&self) -> AdvanceModes {
        self.shared.transport.lock().modes
    }

    pub fn set_modes(&self, modes: AdvanceModes) {
        self.shared.transport.lock().modes = modes;
        self.shared.publish();
    }

    pub fn set_loop_mode(&self, loop_mode: LoopMode) {
        self.shared.transport.lock().modes.loop_mode = loop_mode;
        self.shared.publish();
    }

    pub fn set_shuffle_mode(&self, shuffle_mode: ShuffleMode) {
        self.shared.transport.lock().modes.shuffle_mode = shuffle_mode;
        self.shared.publish();
    }

    pub fn set_favorites_only(&self, favorites_only: bool) {
        self.shared.transport.lock().modes.favorites_only = favorites_only;
        self.shared.publish();
    }

    /// Close any current session and start `track` of `game`
    pub fn load_and_play(&self, game: usize, track: usize) -> Result<(), PlaybackError> {
        {
            let catalog = self.shared.catalog.read();
            let entry = catalog
                .game(game)
                .ok_or(PlaybackError::InvalidGame { index: game })?;
            if track >= entry.tracks.len() {
                return Err(PlaybackError::InvalidTrack { game, track });
            }
        }

        let mut control = self.control.lock();
        self.start_locked(&mut control, (game, track))
    }

    pub fn pause(&self) -> Result<(), PlaybackError> {
        let _control = self.control.lock();
        let mut transport = self.shared.transport.lock();
        match transport.player_state {
            // An auto-advance that is opening the next track keeps the pause
            PlayerState::Playing | PlayerState::FadingOut | PlayerState::Opening => {
                transport.player_state = PlayerState::Paused;
                transport.clock.pause();
                let position = transport.clock.position();
                drop(transport);

                self.shared.sink.pause();
                self.shared.logger.log_paused(position);
                self.shared.publish();
                Ok(())
            }
            PlayerState::Paused => Ok(()),
            PlayerState::Idle => Err(PlaybackError::NotPlaying),
        }
    }

    pub fn resume(&self) -> Result<(), PlaybackError> {
        let _control = self.control.lock();
        let mut transport = self.shared.transport.lock();
        match transport.player_state {
            PlayerState::Paused => {
                transport.player_state = if transport.skip.is_some() {
                    PlayerState::FadingOut
                } else {
                    PlayerState::Playing
                };
                transport.clock.resume();
                let position = transport.clock.position();
                drop(transport);

                self.shared.sink.resume();
                self.shared.logger.log_resumed(position);
                self.shared.publish();
                Ok(())
            }
            PlayerState::Playing | PlayerState::FadingOut => Ok(()),
            PlayerState::Idle | PlayerState::Opening => Err(PlaybackError::NotPlaying),
        }
    }

    pub fn toggle_pause(&self) -> Result<(), PlaybackError> {
        if self.snapshot().is_paused() {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Move the backend to `position` and resynchronize the clock
    pub fn seek(&self, position: Duration) -> Result<(), PlaybackError> {
        let _control = self.control.lock();
        let mut session = self.shared.session.lock();
        let session = session.as_mut().ok_or(PlaybackError::NotPlaying)?;

        let rate = session.sample_rate() as f64;
        let mut target = (position.as_secs_f64() * rate) as u64;
        if session.duration_samples() > 0 {
            target = target.min(session.duration_samples() as u64);
        }
        let Some(landed) = session.seek(target) else {
            log::debug!("Seek ignored by the {} backend", session.kind().name());
            return Ok(());
        };

        let mut transport = self.shared.transport.lock();
        let from = transport.clock.position();
        let to = Duration::from_secs_f64(landed as f64 / rate);
        transport.clock.seek(to);
        if transport.player_state == PlayerState::FadingOut && transport.skip.is_none() {
            let before_fade = transport
                .end_fade
                .map(|fade| !fade.has_started(landed))
                .unwrap_or(true);
            if before_fade {
                transport.player_state = PlayerState::Playing;
            }
        }
        drop(transport);

        self.shared.logger.log_seek(from, to);
        self.shared.publish();
        Ok(())
    }

    pub fn next(&self) -> Result<(), PlaybackError> {
        self.skip(|shared, base, modes| shared.pick_next(base, modes, AdvanceReason::Manual))
    }

    pub fn previous(&self) -> Result<(), PlaybackError> {
        self.skip(|shared, base, _| advance::previous_cursor(&shared.catalog.read(), base))
    }

    /// Manual skip: a short fade while playing, an immediate switch otherwise
    fn skip<F>(&self, choose: F) -> Result<(), PlaybackError>
    where
        F: FnOnce(&Shared, Cursor, AdvanceModes) -> Option<Cursor>,
    {
        let mut control = self.control.lock();

        let (cursor, state, modes, pending) = {
            let transport = self.shared.transport.lock();
            (
                transport.cursor,
                transport.player_state,
                transport.modes,
                transport.skip.map(|s| s.target),
            )
        };

        let target = match cursor {
            Some(current) => choose(&self.shared, pending.unwrap_or(current), modes),
            None => {
                let catalog = self.shared.catalog.read();
                (0..catalog.len())
                    .find(|&g| catalog.track(g, 0).is_some())
                    .map(|g| (g, 0))
            }
        }
        .ok_or(PlaybackError::EmptyLibrary)?;

        let fading = matches!(state, PlayerState::Playing | PlayerState::FadingOut)
            && self.shared.skip_fade_frames > 0
            && control.is_some();
        if !fading {
            return self.start_locked(&mut control, target);
        }

        let session = self.shared.session.lock();
        let Some(position) = session.as_ref().map(|s| s.rendered_samples()) else {
            drop(session);
            return self.start_locked(&mut control, target);
        };
        let mut transport = self.shared.transport.lock();
        match transport.skip.as_mut() {
            Some(skip) => skip.target = target,
            None => {
                transport.skip = Some(SkipFade {
                    envelope: FadeEnvelope::new(position, self.shared.skip_fade_frames),
                    target,
                });
                transport.player_state = PlayerState::FadingOut;
                self.shared
                    .logger
                    .log_fade_started(self.shared.settings.skip_fade, true);
            }
        }
        drop(transport);
        drop(session);

        self.shared.publish();
        Ok(())
    }

    /// Stop playback and release the session
    pub fn stop(&self) {
        let mut control = self.control.lock();
        self.stop_locked(&mut control, "stopped");
    }

    pub fn set_endless_loop(&self, endless: bool) {
        let _control = self.control.lock();
        let mut session = self.shared.session.lock();
        if let Some(session) = session.as_mut() {
            session.set_endless_loop(endless);
        }

        let mut transport = self.shared.transport.lock();
        transport.endless = endless;
        if endless && transport.skip.is_none() && transport.player_state == PlayerState::FadingOut {
            transport.player_state = PlayerState::Playing;
        }
        drop(transport);
        drop(session);
        self.shared.publish();
    }

    pub fn set_playback_speed(&self, speed: f64) {
        let _control = self.control.lock();
        let mut session = self.shared.session.lock();
        if let Some(session) = session.as_mut() {
            session.set_playback_speed(speed);
        }
        self.shared.transport.lock().speed = speed;
    }

    /// Mixer devices of the playing track as (name, volume)
    pub fn devices(&self) -> Vec<(String, u16)> {
        let _control = self.control.lock();
        let session = self.shared.session.lock();
        match session.as_ref() {
            Some(session) => (0..session.device_count())
                .map(|i| {
                    (
                        session.device_name(i).unwrap_or_default(),
                        session.device_volume(i),
                    )
                })
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn set_device_volume(&self, index: usize, volume: u16) -> Result<(), PlaybackError> {
        let _control = self.control.lock();
        let mut session = self.shared.session.lock();
        let session = session.as_mut().ok_or(PlaybackError::NotPlaying)?;
        session.set_device_volume(index, volume);
        Ok(())
    }

    /// Persist a favorite flag and refresh the catalog copy used for shuffle
    pub fn set_favorite(
        &self,
        store: &dyn LibraryStore,
        target: FavoriteTarget,
        favorite: bool,
    ) -> Result<(), LibraryError> {
        store.update_favorite(target, favorite)?;
        self.shared.catalog.write().apply_favorite(target, favorite);
        self.shared.publish();
        Ok(())
    }

    /// Another app took the output; permanent loss also releases the session
    pub fn on_audio_focus_loss(&self, permanent: bool) {
        self.shared.logger.log_focus_lost(permanent);
        if permanent {
            let mut control = self.control.lock();
            self.stop_locked(&mut control, "audio focus lost");
        } else if let Err(e) = self.pause() {
            log::debug!("Focus loss while not playing: {}", e);
        }
    }

    fn start_locked(&self, control: &mut Option<Worker>, cursor: Cursor) -> Result<(), PlaybackError> {
        Self::stop_worker(control);
        self.shared.sink.clear();
        self.shared.open_at(cursor, true)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let worker_cancel = Arc::clone(&cancel);
        let spawned = thread::Builder::new()
            .name("render".to_string())
            .spawn(move || shared.render_loop(&worker_cancel));

        match spawned {
            Ok(handle) => {
                *control = Some(Worker { cancel, handle });
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start render thread: {}", e);
                self.stop_locked(control, "render thread failed");
                Err(e.into())
            }
        }
    }

    fn stop_locked(&self, control: &mut Option<Worker>, reason: &str) {
        Self::stop_worker(control);
        self.shared.sink.clear();

        let mut session = self.shared.session.lock();
        let had_session = match session.take() {
            Some(mut old) => {
                old.close();
                true
            }
            None => false,
        };

        let mut transport = self.shared.transport.lock();
        transport.player_state = PlayerState::Idle;
        transport.skip = None;
        transport.end_fade = None;
        transport.clock.stop();
        drop(transport);
        drop(session);

        if had_session {
            self.shared.logger.log_stopped(reason);
        }
        self.shared.publish();
    }

    /// Cancel the render thread and wait until it has let go of the session
    fn stop_worker(control: &mut Option<Worker>) {
        if let Some(worker) = control.take() {
            worker.cancel.store(true, Ordering::Release);
            if worker.handle.join().is_err() {
                log::error!("Render thread panicked");
            }
        }
    }
}

impl Drop for PlaybackOrchestrator {
    fn drop(&mut self) {
        let mut control = self.control.lock();
        self.stop_locked(&mut control, "shutdown");
    }
}

impl Shared {
    fn snapshot(&self) -> PlaybackSnapshot {
        let transport = self.transport.lock();
        PlaybackSnapshot {
            state: transport.player_state,
            game_index: transport.cursor.map(|c| c.0),
            track_index: transport.cursor.map(|c| c.1),
            game_name: transport.game_name.clone(),
            track_title: transport.track_title.clone(),
            position: transport.clock.position(),
            duration: transport.clock.duration(),
            endless_loop: transport.endless,
            loop_mode: transport.modes.loop_mode,
            shuffle_mode: transport.modes.shuffle_mode,
            favorites_only: transport.modes.favorites_only,
            tags: transport.tags.clone(),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn pick_next(&self, current: Cursor, modes: AdvanceModes, reason: AdvanceReason) -> Option<Cursor> {
        let catalog = self.catalog.read();
        let mut rng = self.rng.lock();
        advance::next_cursor(&catalog, current, modes, reason, &mut *rng)
    }

    /// Close the current session and open the track at `cursor`.
    ///
    /// Unless `resume` is set, a pause requested before or during the open
    /// carries over to the new track. On failure the player is left idle with
    /// the previous cursor published.
    fn open_at(&self, cursor: Cursor, resume: bool) -> Result<(), PlaybackError> {
        let (track, game_name) = {
            let catalog = self.catalog.read();
            let game = catalog
                .game(cursor.0)
                .ok_or(PlaybackError::InvalidGame { index: cursor.0 })?;
            let track = game
                .tracks
                .get(cursor.1)
                .ok_or(PlaybackError::InvalidTrack {
                    game: cursor.0,
                    track: cursor.1,
                })?
                .clone();
            (track, game.game.display_name())
        };

        let mut slot = self.session.lock();
        if let Some(mut old) = slot.take() {
            old.close();
        }

        let (speed, held) = {
            let mut transport = self.transport.lock();
            let held = !resume && transport.player_state == PlayerState::Paused;
            transport.player_state = PlayerState::Opening;
            transport.skip = None;
            transport.end_fade = None;
            transport.empty_fills = 0;
            (transport.speed, held)
        };

        let mut session = match self.factory.open_session(&track.path, track.sub_track) {
            Ok(session) => session,
            Err(e) => {
                {
                    let mut transport = self.transport.lock();
                    transport.player_state = PlayerState::Idle;
                    transport.clock.stop();
                }
                drop(slot);
                self.logger
                    .log_open_failed(&track.path.display().to_string(), &e.to_string());
                self.publish();
                return Err(e.into());
            }
        };

        session.override_duration(track.duration_samples);
        session.set_endless_loop(false);
        if (speed - 1.0).abs() > f64::EPSILON {
            session.set_playback_speed(speed);
        }

        let title = track.display_name();
        let hold = {
            let mut transport = self.transport.lock();
            let hold = held || (!resume && transport.player_state == PlayerState::Paused);
            transport.cursor = Some(cursor);
            transport.game_name = game_name.clone();
            transport.track_title = title.clone();
            transport.tags = session.tags().clone();
            transport.endless = false;
            transport.end_fade =
                FadeEnvelope::for_track_end(session.duration_samples(), self.fade_out_frames);
            transport.clock.start(session.duration());
            if hold {
                transport.player_state = PlayerState::Paused;
                transport.clock.pause();
            } else {
                transport.player_state = PlayerState::Playing;
            }
            hold
        };
        *slot = Some(session);
        drop(slot);

        self.spectrum.reset();
        if !hold {
            self.sink.resume();
        }
        self.logger.log_track_changed(&game_name, &title);
        self.publish();
        Ok(())
    }

    /// Render one buffer under the session lock
    fn render_step(&self, buffer: &mut [i16]) -> Step {
        let mut slot = self.session.lock();
        let Some(session) = slot.as_mut() else {
            return Step::Stopped;
        };
        let mut transport = self.transport.lock();
        if transport.player_state == PlayerState::Paused {
            return Step::Paused;
        }

        let first = session.rendered_samples();
        let frames = session.fill(buffer);
        let position = session.rendered_samples();
        let pcm = &mut buffer[..frames * 2];

        if frames == 0 && !session.is_ended() {
            transport.empty_fills += 1;
        } else {
            transport.empty_fills = 0;
        }
        let stalled = transport.empty_fills >= self.settings.stall_limit;
        if transport.empty_fills == self.settings.stall_limit {
            log::warn!(
                "{} produced no audio for {} buffers, moving on",
                session.path().display(),
                transport.empty_fills
            );
        }

        if let Some(skip) = transport.skip {
            skip.envelope.apply(pcm, first);
            let done = skip.envelope.is_complete(position) || session.is_ended() || stalled;
            let finished = done.then_some(Finish::Skip(skip.target));
            return Step::Rendered { frames, finished };
        }

        if transport.endless && !stalled {
            return Step::Rendered { frames, finished: None };
        }

        if let Some(fade) = transport.end_fade {
            if fade.has_started(position) && transport.player_state == PlayerState::Playing {
                transport.player_state = PlayerState::FadingOut;
                self.logger.log_fade_started(self.settings.fade_out, false);
            }
            fade.apply(pcm, first);
            if fade.is_complete(position) {
                return Step::Rendered {
                    frames,
                    finished: Some(Finish::Natural),
                };
            }
        }

        let finished = (session.is_ended() || stalled).then_some(Finish::Natural);
        Step::Rendered { frames, finished }
    }

    /// Move on after a finished track; false leaves the player idle
    fn advance(&self, finish: Finish) -> bool {
        let (current, modes) = {
            let transport = self.transport.lock();
            (transport.cursor, transport.modes)
        };
        let Some(current) = current else {
            return false;
        };

        let mut target = match finish {
            Finish::Skip(target) => Some(target),
            Finish::Natural => self.pick_next(current, modes, AdvanceReason::Natural),
        };

        // Unplayable tracks are skipped, each at most once
        let attempts = self.catalog.read().track_count().max(1);
        for _ in 0..attempts {
            let Some(cursor) = target else {
                break;
            };
            self.logger.log_advance(cursor.0, cursor.1);
            match self.open_at(cursor, false) {
                Ok(()) => return true,
                Err(_) => target = self.pick_next(cursor, modes, AdvanceReason::Manual),
            }
        }
        false
    }

    fn render_loop(&self, cancel: &AtomicBool) {
        let mut buffer = vec![0i16; self.settings.buffer_frames * 2];
        let mut last_snapshot: Option<Instant> = None;

        while !cancel.load(Ordering::Acquire) {
            if last_snapshot.map_or(true, |t| t.elapsed() >= self.settings.snapshot_interval) {
                self.publish();
                last_snapshot = Some(Instant::now());
            }

            match self.render_step(&mut buffer) {
                Step::Stopped => break,
                Step::Paused => thread::sleep(self.settings.pause_poll),
                Step::Rendered { frames, finished } => {
                    if frames > 0 {
                        let pcm = &buffer[..frames * 2];
                        self.spectrum.push_stereo(pcm);
                        self.write_all(pcm, cancel);
                    } else if finished.is_none() {
                        thread::sleep(self.settings.pause_poll);
                    }

                    if let Some(finish) = finished {
                        if cancel.load(Ordering::Acquire) || !self.advance(finish) {
                            break;
                        }
                    }
                }
            }
        }

        self.publish();
    }

    fn write_all(&self, pcm: &[i16], cancel: &AtomicBool) {
        let mut offset = 0;
        while offset < pcm.len() && !cancel.load(Ordering::Acquire) {
            offset += self.sink.write(&pcm[offset..]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSink;
    use crate::config::DurationConfig;
    use crate::engine::testing::{FakeEngines, FakeSong, FAKE_RATE};
    use crate::engine::DurationPolicy;
    use crate::library::{CatalogGame, SqliteLibrary};
    use crate::models::{Game, NewGame, NewTrack, Track};
    use std::fs;
    use tempfile::TempDir;

    const RATE: u32 = 44100;

    struct Fixture {
        _dir: TempDir,
        engines: FakeEngines,
        sink: Arc<NullSink>,
        player: PlaybackOrchestrator,
    }

    fn build_catalog(dir: &TempDir, layout: &[usize]) -> Catalog {
        let games = layout
            .iter()
            .enumerate()
            .map(|(gi, &count)| {
                let game_id = gi as i64 + 1;
                let tracks = (0..count)
                    .map(|ti| {
                        let path = dir.path().join(format!("g{}t{}.vgm", gi, ti));
                        fs::write(&path, b"Vgm ").unwrap();
                        Track {
                            id: game_id * 100 + ti as i64,
                            game_id,
                            title: format!("Track {}-{}", gi, ti),
                            path,
                            ordinal: ti,
                            duration_samples: -1,
                            favorite: false,
                            sub_track: None,
                        }
                    })
                    .collect();
                CatalogGame {
                    game: Game {
                        id: game_id,
                        path: dir.path().display().to_string(),
                        name: format!("Game {}", gi),
                        system: String::new(),
                        author: String::new(),
                        year: String::new(),
                        chips: Vec::new(),
                        art_path: None,
                        favorite: false,
                        source_archive: String::new(),
                    },
                    tracks,
                }
            })
            .collect();
        Catalog::new(games)
    }

    fn fixture_with(
        layout: &[usize],
        engines: FakeEngines,
        realtime: bool,
        settings: PlaybackSettings,
    ) -> Fixture {
        let dir = TempDir::new().unwrap();
        let catalog = build_catalog(&dir, layout);
        let sink = Arc::new(if realtime {
            NullSink::realtime(RATE)
        } else {
            NullSink::new(RATE)
        });
        let factory = engines.factory(DurationPolicy::new(&DurationConfig::default(), RATE));
        let player = PlaybackOrchestrator::new(factory, sink.clone(), settings, catalog);
        player.reseed(11);
        Fixture {
            _dir: dir,
            engines,
            sink,
            player,
        }
    }

    fn fixture(layout: &[usize], engines: FakeEngines) -> Fixture {
        fixture_with(layout, engines, true, PlaybackSettings::default())
    }

    fn short_songs(engines: FakeEngines, layout: &[usize], frames: u64) -> FakeEngines {
        let mut engines = engines;
        for (gi, &count) in layout.iter().enumerate() {
            for ti in 0..count {
                engines = engines.with_song(
                    &format!("g{}t{}.vgm", gi, ti),
                    FakeSong {
                        frames,
                        ..FakeSong::default()
                    },
                );
            }
        }
        engines
    }

    fn wait_for<F: Fn(&PlaybackSnapshot) -> bool>(player: &PlaybackOrchestrator, check: F) -> PlaybackSnapshot {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let snapshot = player.snapshot();
            if check(&snapshot) {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "timed out, last snapshot {:?}", snapshot);
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_load_and_play_publishes_snapshot() {
        let fx = fixture(&[2], FakeEngines::new());
        let mut rx = fx.player.subscribe();

        fx.player.load_and_play(0, 1).unwrap();

        let snapshot = fx.player.snapshot();
        assert_eq!(snapshot.state, PlayerState::Playing);
        assert_eq!(snapshot.game_index, Some(0));
        assert_eq!(snapshot.track_index, Some(1));
        assert_eq!(snapshot.track_title, "Track 0-1");
        assert_eq!(snapshot.game_name, "Game 0");
        assert_eq!(snapshot.duration, Duration::from_secs(60));
        assert_eq!(fx.player.tags().title.primary, "Fake Song");
        assert_eq!(fx.engines.live(), 1);

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().track_index, Some(1));

        fx.player.stop();
        assert_eq!(fx.player.snapshot().state, PlayerState::Idle);
        assert_eq!(fx.engines.live(), 0);
    }

    #[test]
    fn test_invalid_indices_leave_playback_alone() {
        let fx = fixture(&[1], FakeEngines::new());
        fx.player.load_and_play(0, 0).unwrap();

        assert!(matches!(
            fx.player.load_and_play(3, 0),
            Err(PlaybackError::InvalidGame { index: 3 })
        ));
        assert!(matches!(
            fx.player.load_and_play(0, 5),
            Err(PlaybackError::InvalidTrack { game: 0, track: 5 })
        ));
        assert_eq!(fx.player.snapshot().state, PlayerState::Playing);
        assert_eq!(fx.engines.live(), 1);
    }

    #[test]
    fn test_open_failure_goes_idle_and_keeps_index() {
        let engines = FakeEngines::new().with_song(
            "g0t1.vgm",
            FakeSong {
                reject: true,
                ..FakeSong::default()
            },
        );
        let fx = fixture(&[2], engines);
        fx.player.load_and_play(0, 0).unwrap();

        let result = fx.player.load_and_play(0, 1);
        assert!(matches!(result, Err(PlaybackError::OpenFailed(_))));

        let snapshot = fx.player.snapshot();
        assert_eq!(snapshot.state, PlayerState::Idle);
        assert_eq!(snapshot.track_index, Some(0));
        assert_eq!(fx.engines.live(), 0);
        assert_eq!(
            fx.player.logger().count(crate::logging::PlaybackEventType::OpenFailed),
            1
        );
    }

    #[test]
    fn test_pause_and_resume() {
        let fx = fixture(&[1], FakeEngines::new());
        assert!(matches!(fx.player.pause(), Err(PlaybackError::NotPlaying)));

        fx.player.load_and_play(0, 0).unwrap();
        thread::sleep(Duration::from_millis(50));
        fx.player.pause().unwrap();
        assert!(fx.sink.is_paused());

        let paused = fx.player.snapshot();
        assert_eq!(paused.state, PlayerState::Paused);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fx.player.snapshot().position, paused.position);

        fx.player.toggle_pause().unwrap();
        assert_eq!(fx.player.snapshot().state, PlayerState::Playing);
        assert!(!fx.sink.is_paused());
    }

    #[test]
    fn test_seek_moves_backend_and_clock() {
        let fx = fixture(&[1], FakeEngines::new());
        assert!(matches!(
            fx.player.seek(Duration::from_secs(1)),
            Err(PlaybackError::NotPlaying)
        ));

        fx.player.load_and_play(0, 0).unwrap();
        fx.player.pause().unwrap();
        fx.player.seek(Duration::from_secs(30)).unwrap();

        assert_eq!(fx.player.snapshot().position, Duration::from_secs(30));
        assert_eq!(fx.engines.position(), 30 * FAKE_RATE);

        // Clamped to the track length
        fx.player.seek(Duration::from_secs(600)).unwrap();
        assert_eq!(fx.player.snapshot().position, Duration::from_secs(60));
    }

    #[test]
    fn test_natural_end_advances_sequentially() {
        let layout = [2, 1];
        let engines = short_songs(FakeEngines::new(), &layout, FAKE_RATE / 5);
        let fx = fixture(&layout, engines);

        fx.player.load_and_play(0, 1).unwrap();
        let snapshot = wait_for(&fx.player, |s| s.game_index == Some(1));
        assert_eq!(snapshot.track_index, Some(0));
        assert!(fx.engines.max_live() <= 1);
    }

    #[test]
    fn test_track_that_renders_nothing_still_advances() {
        let engines = FakeEngines::new().with_song(
            "halted.nsf",
            FakeSong {
                length_secs: Some(60),
                stall: true,
                ..FakeSong::default()
            },
        );
        let fx = fixture(&[2], engines);

        let halted = fx._dir.path().join("halted.nsf");
        fs::write(&halted, b"NESM").unwrap();
        let mut catalog = fx.player.catalog();
        catalog.games[0].tracks[0].path = halted;
        fx.player.set_catalog(catalog);

        fx.player.load_and_play(0, 0).unwrap();
        let snapshot = wait_for(&fx.player, |s| s.track_index == Some(1));
        assert_eq!(snapshot.state, PlayerState::Playing);
        assert!(fx.engines.max_live() <= 1);
    }

    #[test]
    fn test_pause_at_track_boundary_carries_over() {
        let fx = fixture(&[2], FakeEngines::new());
        fx.player.load_and_play(0, 0).unwrap();
        fx.player.pause().unwrap();

        // The track finishes on the render thread just as the pause lands
        assert!(fx.player.shared.advance(Finish::Natural));

        let snapshot = fx.player.snapshot();
        assert_eq!(snapshot.track_index, Some(1));
        assert_eq!(snapshot.state, PlayerState::Paused);
        assert!(fx.sink.is_paused());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(fx.player.snapshot().position, snapshot.position);

        fx.player.resume().unwrap();
        assert_eq!(fx.player.snapshot().state, PlayerState::Playing);
        assert!(!fx.sink.is_paused());
        assert_eq!(fx.engines.max_live(), 1);
    }

    #[test]
    fn test_loop_track_reopens_same_track() {
        let layout = [2];
        let engines = short_songs(FakeEngines::new(), &layout, FAKE_RATE / 10);
        let fx = fixture_with(&layout, engines, false, PlaybackSettings::default());
        fx.player.set_loop_mode(LoopMode::Track);

        fx.player.load_and_play(0, 0).unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while fx.engines.opened() < 3 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fx.player.snapshot().track_index, Some(0));
    }

    #[test]
    fn test_end_fade_reaches_silence_and_advances_within_one_buffer() {
        let engines = FakeEngines::new().with_song(
            "g0t0.vgm",
            FakeSong {
                frames: FAKE_RATE * 200,
                ..FakeSong::default()
            },
        );
        let settings = PlaybackSettings {
            fade_out: Duration::from_millis(2000),
            ..PlaybackSettings::default()
        };
        let fx = fixture_with(&[2], engines, false, settings);

        // Curated 100 000 ms length from the library
        let mut catalog = fx.player.catalog();
        catalog.games[0].tracks[0].duration_samples = 100 * RATE as i64;
        fx.player.set_catalog(catalog);

        let shared = &fx.player.shared;
        shared.open_at((0, 0), true).unwrap();

        let end = 100 * RATE as u64;
        let frames_per_buffer = shared.settings.buffer_frames as u64;
        let mut buffer = vec![0i16; shared.settings.buffer_frames * 2];
        let mut saw_fading = false;

        let rendered = loop {
            let before = shared.session.lock().as_ref().unwrap().rendered_samples();
            match shared.render_step(&mut buffer) {
                Step::Rendered { frames, finished } => {
                    saw_fading |= shared.transport.lock().player_state == PlayerState::FadingOut;
                    if let Some(finish) = finished {
                        assert_eq!(finish, Finish::Natural);
                        // Every frame at or past the end is silent
                        let silent_from = end.saturating_sub(before) as usize;
                        assert!(buffer[silent_from * 2..frames * 2].iter().all(|&s| s == 0));
                        break before + frames as u64;
                    }
                    if before + (frames as u64) < end - 2 * RATE as u64 {
                        assert!(buffer[..frames * 2].iter().all(|&s| s != 0));
                    }
                }
                other => panic!("unexpected step {:?}", other),
            }
        };

        assert!(saw_fading);
        assert!(rendered >= end);
        assert!(rendered < end + frames_per_buffer);
    }

    #[test]
    fn test_skip_fades_then_switches() {
        let fx = fixture(&[3], FakeEngines::new());
        fx.player.load_and_play(0, 0).unwrap();
        thread::sleep(Duration::from_millis(30));

        fx.player.next().unwrap();
        let fading = fx.player.snapshot();
        assert!(matches!(fading.state, PlayerState::FadingOut | PlayerState::Playing));

        // A second skip during the fade moves the target on
        fx.player.next().unwrap();
        let snapshot = wait_for(&fx.player, |s| s.track_index == Some(2));
        assert_eq!(snapshot.state, PlayerState::Playing);

        fx.player.previous().unwrap();
        wait_for(&fx.player, |s| s.track_index == Some(1));
        assert_eq!(fx.engines.max_live(), 1);
        assert_eq!(fx.engines.violations(), 0);
    }

    #[test]
    fn test_next_from_idle_starts_first_track() {
        let fx = fixture(&[0, 2], FakeEngines::new());
        fx.player.next().unwrap();

        let snapshot = fx.player.snapshot();
        assert_eq!((snapshot.game_index, snapshot.track_index), (Some(1), Some(0)));

        let empty = fixture(&[0], FakeEngines::new());
        assert!(matches!(empty.player.next(), Err(PlaybackError::EmptyLibrary)));
    }

    #[test]
    fn test_endless_loop_suppresses_natural_end() {
        let layout = [2];
        let engines = short_songs(FakeEngines::new(), &layout, FAKE_RATE / 2);
        let fx = fixture(&layout, engines);

        fx.player.load_and_play(0, 0).unwrap();
        fx.player.set_endless_loop(true);
        assert!(fx.player.snapshot().endless_loop);

        thread::sleep(Duration::from_millis(900));
        let snapshot = fx.player.snapshot();
        assert_eq!(snapshot.track_index, Some(0));
        assert_eq!(fx.engines.opened(), 1);
    }

    #[test]
    fn test_focus_loss() {
        let fx = fixture(&[1], FakeEngines::new());
        fx.player.load_and_play(0, 0).unwrap();

        fx.player.on_audio_focus_loss(false);
        assert_eq!(fx.player.snapshot().state, PlayerState::Paused);
        assert_eq!(fx.engines.live(), 1);

        fx.player.on_audio_focus_loss(true);
        assert_eq!(fx.player.snapshot().state, PlayerState::Idle);
        assert_eq!(fx.engines.live(), 0);
    }

    #[test]
    fn test_devices_and_volume_pass_through() {
        let fx = fixture(&[1], FakeEngines::new());
        assert!(fx.player.devices().is_empty());
        assert!(fx.player.set_device_volume(0, 0x80).is_err());

        fx.player.load_and_play(0, 0).unwrap();
        let devices = fx.player.devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].0, "YM2612");

        fx.player.set_device_volume(1, 0x40).unwrap();
        assert_eq!(fx.player.devices()[1].1, 0x40);
        fx.player.set_playback_speed(1.5);
    }

    #[test]
    fn test_set_favorite_updates_store_and_catalog() {
        let fx = fixture(&[1], FakeEngines::new());
        let store = SqliteLibrary::open_in_memory().unwrap();
        let game_id = store
            .insert_or_replace_game(&NewGame {
                path: "/lib/g".to_string(),
                name: "G".to_string(),
                ..NewGame::default()
            })
            .unwrap();
        let tracks = store
            .insert_tracks(
                game_id,
                &[NewTrack {
                    title: "T".to_string(),
                    path: "/lib/g/t.vgm".into(),
                    ordinal: 0,
                    duration_samples: -1,
                    sub_track: None,
                }],
            )
            .unwrap();
        fx.player.set_catalog(Catalog::load(&store).unwrap());

        fx.player
            .set_favorite(&store, FavoriteTarget::Track(tracks[0].id), true)
            .unwrap();

        assert!(store.get_tracks_for_game(game_id).unwrap()[0].favorite);
        assert!(fx.player.catalog().games[0].tracks[0].favorite);
    }

    #[test]
    fn test_set_catalog_keeps_playing_track_selected() {
        let fx = fixture(&[2, 2], FakeEngines::new());
        fx.player.load_and_play(1, 1).unwrap();

        let mut catalog = fx.player.catalog();
        catalog.games.swap(0, 1);
        fx.player.set_catalog(catalog);

        let snapshot = fx.player.snapshot();
        assert_eq!((snapshot.game_index, snapshot.track_index), (Some(0), Some(1)));
    }

    #[test]
    fn test_back_to_back_loads_never_overlap_sessions() {
        let engines = FakeEngines::new().with_render_delay(Duration::from_micros(200));
        let fx = Arc::new(fixture_with(&[4, 4], engines, false, PlaybackSettings::default()));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let fx = Arc::clone(&fx);
                thread::spawn(move || {
                    for i in 0..25 {
                        let _ = fx.player.load_and_play((worker + i) % 2, i % 4);
                        if i % 3 == 0 {
                            let _ = fx.player.next();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fx.engines.max_live(), 1);
        assert_eq!(fx.engines.violations(), 0);
        fx.player.stop();
        assert_eq!(fx.engines.live(), 0);
    }
}
