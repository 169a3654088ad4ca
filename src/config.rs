//! Timeline files: YAML effect lists, optionally watched for changes.

use crate::effect::Effect;
use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use tracing::{error, info, warn};

/// An ordered list of effects to register with the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub effects: Vec<Effect>,
}

impl Timeline {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let timeline: Timeline = serde_yaml::from_str(source).context("Failed to parse timeline")?;
        timeline.check()?;
        Ok(timeline)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read timeline {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid timeline {:?}", path))
    }

    /// Rejects duplicate identifiers and bad timing before anything is registered.
    fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for effect in &self.effects {
            effect.validate()?;
            if !seen.insert(effect.identifier.as_str()) {
                anyhow::bail!("effect id '{}' appears more than once", effect.identifier);
            }
        }
        Ok(())
    }
}

/// Watches a timeline file and yields the new contents after each change.
pub struct TimelineWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<std::result::Result<Event, notify::Error>>,
}

impl TimelineWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, rx) = channel();

        let mut watcher =
            RecommendedWatcher::new(tx, notify::Config::default()).context("Failed to create timeline watcher")?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch timeline {:?}", path))?;
        info!("Watching timeline {:?} for changes", path);

        Ok(Self {
            path,
            _watcher: watcher,
            rx,
        })
    }

    /// Drains pending events; returns the reparsed timeline if the file changed.
    ///
    /// Unreadable or invalid edits are logged and skipped so a half-saved file
    /// does not tear down the running timeline.
    pub fn poll(&mut self) -> Option<Timeline> {
        let mut needs_reload = false;
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(event) => {
                    if matches!(event.kind, notify::EventKind::Modify(_) | notify::EventKind::Create(_)) {
                        needs_reload = true;
                    }
                }
                Err(e) => warn!("Timeline watch error: {}", e),
            }
        }

        if !needs_reload {
            return None;
        }

        info!("Timeline file changed, reloading...");
        match Timeline::load(&self.path) {
            Ok(timeline) => Some(timeline),
            Err(e) => {
                error!("Keeping current timeline: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{BasicParams, EffectKind};
    use std::io::Write;

    const TIMELINE: &str = r#"
effects:
  - id: warm
    shader: basic
    start: 0
    brightness: 1.1
    sepia: 0.3
  - id: flash
    shader: shine
    start: 2.0
    duration: 0.5
    center: [0.0, 0.0]
    intensity: 2.0
  - id: off
    shader: passthrough
"#;

    #[test]
    fn parses_documented_format() {
        let timeline = Timeline::from_yaml_str(TIMELINE).unwrap();
        assert_eq!(timeline.effects.len(), 3);
        assert_eq!(
            timeline.effects[0].kind,
            EffectKind::Basic(BasicParams {
                brightness: Some(1.1),
                sepia: Some(0.3),
                ..Default::default()
            })
        );
        assert_eq!(timeline.effects[1].end_time(), Some(2.5));
        assert_eq!(timeline.effects[2].start_time, 0.0);
    }

    #[test]
    fn empty_document_has_no_effects() {
        let timeline = Timeline::from_yaml_str("effects: []").unwrap();
        assert!(timeline.effects.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let yaml = "effects:\n  - {id: a, shader: blur}\n  - {id: a, shader: grayscale}\n";
        let err = Timeline::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let yaml = "effects:\n  - {id: a, shader: blur, duration: -1}\n";
        assert!(Timeline::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TIMELINE.as_bytes()).unwrap();
        let timeline = Timeline::load(file.path()).unwrap();
        assert_eq!(timeline.effects[1].identifier, "flash");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Timeline::load(dir.path().join("missing.yaml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read timeline"));
    }
}
