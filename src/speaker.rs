//! Speaker profiles and their store
//!
//! A profile is written once by registration and only read afterwards. The
//! file-backed store keeps each speaker under `<media_root>/speakers/<id>/`
//! with the uploaded source video, the voice reference, the clip bank and a
//! `profile.json` manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

const PROFILE_FILE: &str = "profile.json";
const MAX_SPEAKER_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub speaker_id: String,
    pub reference_audio: PathBuf,
    /// Pre-cut clips in playback order
    pub clips: Vec<PathBuf>,
    pub source_video: PathBuf,
    pub clip_length_secs: f64,
    pub created_at: DateTime<Utc>,
}

/// Speaker ids become directory names: ASCII letters, digits, `-` and `_` only
pub fn validate_speaker_id(speaker_id: &str) -> Result<()> {
    if speaker_id.is_empty() {
        return Err(PipelineError::Validation("speaker_id is required".to_string()));
    }
    if speaker_id.len() > MAX_SPEAKER_ID_LEN {
        return Err(PipelineError::Validation(format!(
            "speaker_id longer than {} characters",
            MAX_SPEAKER_ID_LEN
        )));
    }
    if !speaker_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PipelineError::Validation(format!(
            "speaker_id {:?} may only contain letters, digits, '-' and '_'",
            speaker_id
        )));
    }
    Ok(())
}

/// Durable record store keyed by speaker id
pub trait SpeakerStore: Send + Sync {
    /// Load a registered profile. Fails with `NotFound` for unknown speakers
    /// and for profiles whose clip bank or reference audio is gone.
    fn get(&self, speaker_id: &str) -> Result<SpeakerProfile>;

    fn exists(&self, speaker_id: &str) -> bool;

    /// Claim `speaker_id` for registration and return its directory.
    /// Fails with `AlreadyRegistered` if the id is taken or being registered.
    fn reserve(&self, speaker_id: &str) -> Result<PathBuf>;

    /// Persist a completed registration
    fn commit(&self, profile: &SpeakerProfile) -> Result<()>;

    /// Drop a reservation whose registration failed
    fn discard(&self, speaker_id: &str);
}

pub struct FileSpeakerStore {
    root: PathBuf,
}

impl FileSpeakerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn speaker_dir(&self, speaker_id: &str) -> PathBuf {
        self.root.join(speaker_id)
    }

    fn manifest(&self, speaker_id: &str) -> PathBuf {
        self.speaker_dir(speaker_id).join(PROFILE_FILE)
    }
}

impl SpeakerStore for FileSpeakerStore {
    fn get(&self, speaker_id: &str) -> Result<SpeakerProfile> {
        validate_speaker_id(speaker_id)?;
        let raw = match std::fs::read(self.manifest(speaker_id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(PipelineError::NotFound(format!(
                    "speaker profile {}; register the speaker first",
                    speaker_id
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let profile: SpeakerProfile = serde_json::from_slice(&raw)?;

        if profile.clips.is_empty() {
            return Err(PipelineError::NotFound(format!(
                "video clips for speaker {}",
                speaker_id
            )));
        }
        if let Some(clip) = profile.clips.iter().find(|c| !c.is_file()) {
            return Err(PipelineError::NotFound(format!(
                "clip {} of speaker {}",
                clip.display(),
                speaker_id
            )));
        }
        if !profile.reference_audio.is_file() {
            return Err(PipelineError::NotFound(format!(
                "reference audio of speaker {}",
                speaker_id
            )));
        }
        Ok(profile)
    }

    fn exists(&self, speaker_id: &str) -> bool {
        validate_speaker_id(speaker_id).is_ok() && self.manifest(speaker_id).is_file()
    }

    fn reserve(&self, speaker_id: &str) -> Result<PathBuf> {
        validate_speaker_id(speaker_id)?;
        std::fs::create_dir_all(&self.root)?;
        let dir = self.speaker_dir(speaker_id);
        // create_dir, not create_dir_all: exactly one caller can win
        match std::fs::create_dir(&dir) {
            Ok(()) => {
                log::debug!("Reserved speaker directory {}", dir.display());
                Ok(dir)
            }
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                Err(PipelineError::AlreadyRegistered(speaker_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&self, profile: &SpeakerProfile) -> Result<()> {
        let manifest = self.manifest(&profile.speaker_id);
        let staging = manifest.with_extension("json.tmp");
        std::fs::write(&staging, serde_json::to_vec_pretty(profile)?)?;
        std::fs::rename(&staging, &manifest)?;
        log::info!(
            "Speaker {} registered with {} clip(s)",
            profile.speaker_id,
            profile.clips.len()
        );
        Ok(())
    }

    fn discard(&self, speaker_id: &str) {
        if validate_speaker_id(speaker_id).is_err() {
            return;
        }
        let dir = self.speaker_dir(speaker_id);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != IoErrorKind::NotFound {
                log::warn!("Error removing speaker directory '{}': {}", dir.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(store: &FileSpeakerStore, id: &str, clips: usize) -> SpeakerProfile {
        let dir = store.reserve(id).unwrap();
        let reference = dir.join("voice_reference.wav");
        std::fs::write(&reference, b"wav").unwrap();
        let clips = (0..clips)
            .map(|i| {
                let clip = dir.join(format!("clip_{}.mp4", i));
                std::fs::write(&clip, b"mp4").unwrap();
                clip
            })
            .collect();
        let profile = SpeakerProfile {
            speaker_id: id.to_string(),
            reference_audio: reference,
            clips,
            source_video: dir.join("source.mp4"),
            clip_length_secs: 5.0,
            created_at: Utc::now(),
        };
        store.commit(&profile).unwrap();
        profile
    }

    #[test]
    fn test_round_trip_through_manifest() {
        let root = tempfile::tempdir().unwrap();
        let store = FileSpeakerStore::new(root.path());
        let profile = registered(&store, "alice", 2);

        assert!(store.exists("alice"));
        assert_eq!(store.get("alice").unwrap(), profile);
    }

    #[test]
    fn test_unknown_speaker_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let store = FileSpeakerStore::new(root.path());
        assert!(!store.exists("bob"));
        assert!(matches!(store.get("bob").unwrap_err(), PipelineError::NotFound(_)));
    }

    #[test]
    fn test_second_reservation_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let store = FileSpeakerStore::new(root.path());
        let profile = registered(&store, "carol", 1);

        let err = store.reserve("carol").unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRegistered(ref id) if id == "carol"));
        // The first profile is untouched
        assert_eq!(store.get("carol").unwrap().clips, profile.clips);
    }

    #[test]
    fn test_in_flight_reservation_blocks_another() {
        let root = tempfile::tempdir().unwrap();
        let store = FileSpeakerStore::new(root.path());
        store.reserve("dave").unwrap();
        assert!(!store.exists("dave"));
        assert!(matches!(store.reserve("dave").unwrap_err(), PipelineError::AlreadyRegistered(_)));

        store.discard("dave");
        assert!(store.reserve("dave").is_ok());
    }

    #[test]
    fn test_empty_clip_bank_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let store = FileSpeakerStore::new(root.path());
        registered(&store, "erin", 0);
        assert!(matches!(store.get("erin").unwrap_err(), PipelineError::NotFound(ref m) if m.contains("clips")));
    }

    #[test]
    fn test_speaker_id_rules() {
        assert!(validate_speaker_id("user_42-a").is_ok());
        assert!(validate_speaker_id("").is_err());
        assert!(validate_speaker_id("../etc").is_err());
        assert!(validate_speaker_id("a b").is_err());
        assert!(validate_speaker_id(&"x".repeat(65)).is_err());
    }
}
