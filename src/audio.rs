//! Short sound cues for game events.
//!
//! A [`CuePlayer`] loads every [`Cue`] once through an [`AudioSink`] and
//! hands the sink a fresh copy of the preloaded clip on each play, so the
//! same cue may overlap itself. Playback failures (a muted device, a
//! blocked autoplay) are logged and swallowed.

use std::collections::HashMap;

use crate::error::Result;

/// Playback volume for every cue.
pub const CUE_VOLUME: f32 = 0.5;

/// The five game sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    Correct,
    Incorrect,
    Join,
    Leave,
    Lock,
}

impl Cue {
    pub const ALL: [Cue; 5] = [
        Cue::Correct,
        Cue::Incorrect,
        Cue::Join,
        Cue::Leave,
        Cue::Lock,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Lock => "lock",
        }
    }

    /// Asset path relative to the game's base path.
    pub fn asset_path(self) -> &'static str {
        match self {
            Self::Correct => "/assets/sounds/correct_answer.mp3",
            Self::Incorrect => "/assets/sounds/incorrect_answer.mp3",
            Self::Join => "/assets/sounds/player_join.mp3",
            Self::Leave => "/assets/sounds/player_leave.mp3",
            Self::Lock => "/assets/sounds/lock_answer.mp3",
        }
    }
}

/// Loads and plays clips. Implemented by whatever audio backend the host has.
pub trait AudioSink: Send {
    type Clip: Clone + Send;

    /// Load the clip for `cue` from `path`.
    ///
    /// # Errors
    ///
    /// Any error leaves the cue silent.
    fn load(&mut self, cue: Cue, path: &str) -> Result<Self::Clip>;

    /// Start playing `clip`. Must not block until playback ends.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller and otherwise ignored.
    fn play(&mut self, clip: Self::Clip, volume: f32) -> Result<()>;
}

/// Preloaded cue pool.
pub struct CuePlayer<A: AudioSink> {
    sink: A,
    clips: HashMap<Cue, A::Clip>,
}

impl<A: AudioSink> CuePlayer<A> {
    /// Load every cue from `base_path` (e.g. `/wahlplakatgame`).
    pub fn preload(mut sink: A, base_path: &str) -> Self {
        let mut clips = HashMap::new();
        for cue in Cue::ALL {
            let path = format!("{base_path}{}", cue.asset_path());
            match sink.load(cue, &path) {
                Ok(clip) => {
                    clips.insert(cue, clip);
                }
                Err(e) => tracing::warn!(cue = cue.name(), %path, "failed to load sound: {e}"),
            }
        }
        Self { sink, clips }
    }

    pub fn play(&mut self, cue: Cue) {
        let Some(clip) = self.clips.get(&cue) else {
            tracing::debug!(cue = cue.name(), "sound not loaded");
            return;
        };
        if let Err(e) = self.sink.play(clip.clone(), CUE_VOLUME) {
            tracing::warn!(cue = cue.name(), "sound play failed: {e}");
        }
    }

    pub fn is_loaded(&self, cue: Cue) -> bool {
        self.clips.contains_key(&cue)
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }
}

impl<A: AudioSink> std::fmt::Debug for CuePlayer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CuePlayer")
            .field("loaded", &self.clips.len())
            .finish()
    }
}

/// Sink that only logs. Used where no audio device exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAudio;

impl AudioSink for LogAudio {
    type Clip = Cue;

    fn load(&mut self, cue: Cue, path: &str) -> Result<Cue> {
        tracing::trace!(cue = cue.name(), path, "sound registered");
        Ok(cue)
    }

    fn play(&mut self, clip: Cue, volume: f32) -> Result<()> {
        tracing::info!(cue = clip.name(), volume, "♪");
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[derive(Default)]
    struct Flaky {
        loaded: Vec<String>,
        played: Vec<(Cue, f32)>,
    }

    impl AudioSink for Flaky {
        type Clip = Cue;

        fn load(&mut self, cue: Cue, path: &str) -> Result<Cue> {
            if cue == Cue::Leave {
                return Err(ClientError::Io(std::io::Error::other("missing")));
            }
            self.loaded.push(path.to_string());
            Ok(cue)
        }

        fn play(&mut self, clip: Cue, volume: f32) -> Result<()> {
            self.played.push((clip, volume));
            if clip == Cue::Lock {
                return Err(ClientError::Io(std::io::Error::other("autoplay blocked")));
            }
            Ok(())
        }
    }

    #[test]
    fn preload_resolves_paths_under_base() {
        let player = CuePlayer::preload(Flaky::default(), "/wahlplakatgame");
        assert!(player
            .sink()
            .loaded
            .contains(&"/wahlplakatgame/assets/sounds/correct_answer.mp3".to_string()));
        assert!(player.is_loaded(Cue::Correct));
        assert!(!player.is_loaded(Cue::Leave));
    }

    #[test]
    fn play_overlaps_and_swallows_errors() {
        let mut player = CuePlayer::preload(Flaky::default(), "");
        player.play(Cue::Join);
        player.play(Cue::Join);
        player.play(Cue::Lock);
        player.play(Cue::Leave);
        assert_eq!(
            player.sink().played,
            vec![(Cue::Join, 0.5), (Cue::Join, 0.5), (Cue::Lock, 0.5)]
        );
    }
}
