//! Track selection.
//!
//! [`TrackSelection`] keeps the probed files a caller has loaded and which of
//! their tracks are picked, with optional per-track language overrides. The
//! probe results themselves are never mutated; selection state lives beside
//! them and is turned into [`MixInput`]s for submission.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tm_core::{ProbedFile, Track, TrackKind};

use crate::state::MixInput;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("file not loaded: {}", .0.display())]
    UnknownFile(PathBuf),

    #[error("no track {track_id} in {}", .path.display())]
    UnknownTrack { path: PathBuf, track_id: String },

    #[error("track {track_id} in {} is not selected", .path.display())]
    NotSelected { path: PathBuf, track_id: String },
}

type TrackKey = (PathBuf, String);

/// Loaded files plus the tracks picked from them.
#[derive(Debug, Clone, Default)]
pub struct TrackSelection {
    /// In load order.
    files: Vec<Arc<ProbedFile>>,
    /// Selected tracks and their language override.
    selected: HashMap<TrackKey, Option<String>>,
}

impl TrackSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a probed file.
    ///
    /// A file already loaded under the same path is replaced in place;
    /// selections of tracks that no longer exist in the new probe are dropped.
    pub fn load(&mut self, file: impl Into<Arc<ProbedFile>>) {
        let file = file.into();
        match self.files.iter_mut().find(|f| f.path == file.path) {
            Some(slot) => {
                let path = file.path.clone();
                let before = self.selected.len();
                self.selected
                    .retain(|(p, id), _| p != &path || file.contains(id));
                let dropped = before - self.selected.len();
                if dropped > 0 {
                    tracing::debug!(
                        path = %path.display(),
                        dropped,
                        "reloaded file no longer has some selected tracks"
                    );
                }
                *slot = file;
            }
            None => self.files.push(file),
        }
    }

    /// Remove a file and every selection in it.
    pub fn unload(&mut self, path: &Path) -> Option<Arc<ProbedFile>> {
        let index = self.files.iter().position(|f| f.path == path)?;
        self.selected.retain(|(p, _), _| p != path);
        Some(self.files.remove(index))
    }

    pub fn files(&self) -> &[Arc<ProbedFile>] {
        &self.files
    }

    pub fn file(&self, path: &Path) -> Option<&Arc<ProbedFile>> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Flip the selection of one track. Returns the new state.
    pub fn toggle(&mut self, path: &Path, track_id: &str) -> Result<bool, SelectionError> {
        let key = self.key(path, track_id)?;
        if self.selected.remove(&key).is_some() {
            Ok(false)
        } else {
            self.selected.insert(key, None);
            Ok(true)
        }
    }

    pub fn select(&mut self, path: &Path, track_id: &str) -> Result<(), SelectionError> {
        let key = self.key(path, track_id)?;
        self.selected.entry(key).or_insert(None);
        Ok(())
    }

    /// Deselect a track. Deselecting also forgets its language override.
    pub fn deselect(&mut self, path: &Path, track_id: &str) -> Result<(), SelectionError> {
        let key = self.key(path, track_id)?;
        self.selected.remove(&key);
        Ok(())
    }

    pub fn is_selected(&self, path: &Path, track_id: &str) -> bool {
        self.selected
            .contains_key(&(path.to_path_buf(), track_id.to_string()))
    }

    /// Relabel the language of a selected track in the output.
    ///
    /// An empty or whitespace-only tag clears the override.
    pub fn set_lang_override(
        &mut self,
        path: &Path,
        track_id: &str,
        lang: &str,
    ) -> Result<(), SelectionError> {
        let key = self.key(path, track_id)?;
        let slot = self
            .selected
            .get_mut(&key)
            .ok_or_else(|| SelectionError::NotSelected {
                path: key.0.clone(),
                track_id: key.1.clone(),
            })?;
        let lang = lang.trim();
        *slot = (!lang.is_empty()).then(|| lang.to_string());
        Ok(())
    }

    pub fn clear_lang_override(&mut self, path: &Path, track_id: &str) -> Result<(), SelectionError> {
        let key = self.key(path, track_id)?;
        if let Some(slot) = self.selected.get_mut(&key) {
            *slot = None;
        }
        Ok(())
    }

    pub fn lang_override(&self, path: &Path, track_id: &str) -> Option<&str> {
        self.selected
            .get(&(path.to_path_buf(), track_id.to_string()))
            .and_then(|lang| lang.as_deref())
    }

    /// Deselect everything. Loaded files stay loaded.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected tracks in file load order, then probe order.
    pub fn selected_tracks(&self) -> Vec<(&Path, &Track)> {
        self.files
            .iter()
            .flat_map(|file| {
                file.tracks
                    .iter()
                    .filter(move |t| self.is_selected(&file.path, &t.track_id))
                    .map(move |t| (file.path.as_path(), t))
            })
            .collect()
    }

    /// Group the selection into mix inputs.
    ///
    /// One input per `(file, kind)` pair that has selected tracks. Inputs are
    /// ordered video, audio, subtitle, then by file load order; track ids keep
    /// probe order and carry any language override.
    pub fn to_mix_inputs(&self) -> Vec<MixInput> {
        let mut inputs = Vec::new();
        for kind in TrackKind::ALL {
            for file in &self.files {
                let mut input = MixInput {
                    path: file.path.clone(),
                    kind,
                    track_ids: Vec::new(),
                    track_langs: BTreeMap::new(),
                };
                for track in file.tracks_of(kind) {
                    let key = (file.path.clone(), track.track_id.clone());
                    if let Some(lang) = self.selected.get(&key) {
                        input.track_ids.push(track.track_id.clone());
                        if let Some(lang) = lang {
                            input.track_langs.insert(track.track_id.clone(), lang.clone());
                        }
                    }
                }
                if !input.track_ids.is_empty() {
                    inputs.push(input);
                }
            }
        }
        inputs
    }

    fn key(&self, path: &Path, track_id: &str) -> Result<TrackKey, SelectionError> {
        let file = self
            .file(path)
            .ok_or_else(|| SelectionError::UnknownFile(path.to_path_buf()))?;
        if !file.contains(track_id) {
            return Err(SelectionError::UnknownTrack {
                path: path.to_path_buf(),
                track_id: track_id.to_string(),
            });
        }
        Ok((path.to_path_buf(), track_id.to_string()))
    }
}
