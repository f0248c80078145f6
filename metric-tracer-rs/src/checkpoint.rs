//! Saving and loading tracer state files.
//!
//! States are written as pretty JSON through a sibling temporary file that
//! is renamed into place, so a crash mid-write never leaves a truncated
//! state behind.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Write `state` to `path` as pretty JSON, replacing any existing file.
///
/// # Errors
///
/// Returns [`crate::TracerError::Serde`] if the state cannot be encoded and
/// [`crate::TracerError::Io`] if the file cannot be written.
pub fn save_json<T: Serialize>(path: impl AsRef<Path>, state: &T) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(state)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    debug!("saved state to {} ({} bytes)", path.display(), json.len());
    Ok(())
}

/// Read a state written by [`save_json`].
///
/// # Errors
///
/// Returns [`crate::TracerError::Io`] if the file cannot be read and
/// [`crate::TracerError::Serde`] if it does not hold a `T`.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)?;
    let state = serde_json::from_str(&json)?;
    debug!("loaded state from {}", path.display());
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TracerError;
    use crate::{GroupTracer, GroupTracerState, TracerConfig};
    use tempfile::tempdir;

    #[test]
    fn test_save_then_load_group_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let tracer = GroupTracer::new(TracerConfig::default()).unwrap();
        tracer.update_history("train", 0.0, [("loss", f64::NAN)]).unwrap();
        tracer.update_history("test", 0.0, [("acc", 0.5)]).unwrap();
        save_json(&path, &tracer.state_dict()).unwrap();

        let loaded: GroupTracerState = load_json(&path).unwrap();
        assert_eq!(loaded, tracer.state_dict());
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_save_overwrites_previous_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        save_json(&path, &vec![1, 2, 3]).unwrap();
        save_json(&path, &vec![4]).unwrap();
        let loaded: Vec<i32> = load_json(&path).unwrap();
        assert_eq!(loaded, vec![4]);
    }

    #[test]
    fn test_load_errors_are_typed() {
        let dir = tempdir().unwrap();
        let missing = load_json::<GroupTracerState>(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(TracerError::Io(_))));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let bad = load_json::<GroupTracerState>(&path);
        assert!(matches!(bad, Err(TracerError::Serde(_))));
    }
}
