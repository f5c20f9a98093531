//! Generated artifact layout.
//!
//! One [`ArtifactPaths`] is created per process run. It fixes the run
//! timestamp and the per-day folder at construction, so every session in
//! the run agrees on where screenshots, videos, traces, and reports land:
//!
//! ```text
//! <root>/screenshots/<run-stamp>/      per-run screenshots
//! <root>/screenshots/latest/           cleared and repopulated each run
//! <root>/videos/<day>/<session-dir>/   one exclusive dir per session
//! <root>/traces/<day>/                 trace files
//! <root>/reports/LatestReport/         newest HTML report copy
//! ```

use crate::engine::Screenshot;
use crate::result::{EnsayoError, EnsayoResult};
use chrono::Local;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Human-readable timestamp for file naming, e.g. `7_Mar_2026_4_05_31_PM`
#[must_use]
pub fn readable_timestamp() -> String {
    Local::now().format("%-d_%b_%Y_%-I_%M_%S_%p").to_string()
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .take(48)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}

/// Artifact directory layout for one process run
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    root: PathBuf,
    run_stamp: String,
    day: String,
}

impl ArtifactPaths {
    /// Create the layout rooted at `root`, stamping the current time
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            run_stamp: readable_timestamp(),
            day: Local::now().format("%Y-%m-%d").to_string(),
        }
    }

    /// Create the layout at the default root, `target/ensayo`
    #[must_use]
    pub fn default_root() -> Self {
        Self::new("target/ensayo")
    }

    /// Root directory of all artifacts
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-run screenshot directory
    #[must_use]
    pub fn run_screenshot_dir(&self) -> PathBuf {
        self.root.join("screenshots").join(&self.run_stamp)
    }

    /// The `latest` screenshot directory, repopulated each run
    #[must_use]
    pub fn latest_screenshot_dir(&self) -> PathBuf {
        self.root.join("screenshots").join("latest")
    }

    /// Per-day video directory
    #[must_use]
    pub fn videos_dir(&self) -> PathBuf {
        self.root.join("videos").join(&self.day)
    }

    /// Per-day trace directory
    #[must_use]
    pub fn traces_dir(&self) -> PathBuf {
        self.root.join("traces").join(&self.day)
    }

    /// Report output directory
    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Create the run's directories. The `latest` screenshot directory is
    /// cleared before being recreated; everything else is additive.
    pub fn prepare(&self) -> EnsayoResult<()> {
        let latest = self.latest_screenshot_dir();
        if latest.exists() {
            std::fs::remove_dir_all(&latest)?;
        }
        for dir in [
            self.run_screenshot_dir(),
            latest,
            self.videos_dir(),
            self.traces_dir(),
            self.reports_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Allocate an exclusive recording directory for one session.
    ///
    /// The uuid suffix keeps two sessions of the same test name apart even
    /// when started within the same second.
    pub fn video_dir_for(&self, test_name: &str) -> EnsayoResult<PathBuf> {
        let dir = self.videos_dir().join(format!(
            "{}_{}_{}",
            sanitize(test_name),
            readable_timestamp(),
            &Uuid::new_v4().simple().to_string()[..8],
        ));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path for one session's trace file
    #[must_use]
    pub fn trace_path_for(&self, test_name: &str) -> PathBuf {
        self.traces_dir().join(format!(
            "{}_{}_trace.json",
            sanitize(test_name),
            readable_timestamp()
        ))
    }

    /// Save a screenshot into both the run directory and the `latest`
    /// directory, returning the run-directory path.
    pub fn save_screenshot(&self, shot: &Screenshot, label: &str) -> EnsayoResult<PathBuf> {
        let name = format!("{}_{}.png", sanitize(label), readable_timestamp());
        let run_path = self.run_screenshot_dir().join(&name);
        if let Some(parent) = run_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&run_path, &shot.data)?;
        let latest = self.latest_screenshot_dir();
        std::fs::create_dir_all(&latest)?;
        std::fs::write(latest.join(&name), &shot.data)?;
        Ok(run_path)
    }

    /// Rename the newest recording inside a session-owned directory to carry
    /// the test name. Returns the final path, or None when the engine wrote
    /// no recording (not an error; video support is engine-dependent).
    pub fn finalize_recording(
        &self,
        session_dir: &Path,
        test_name: &str,
    ) -> EnsayoResult<Option<PathBuf>> {
        if !session_dir.exists() {
            return Ok(None);
        }
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(session_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }
        let Some((_, source)) = newest else {
            return Ok(None);
        };
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("webm")
            .to_string();
        let target = session_dir.join(format!(
            "{}_{}.{ext}",
            sanitize(test_name),
            readable_timestamp()
        ));
        std::fs::rename(&source, &target)?;
        Ok(Some(target))
    }

    /// Copy the newest HTML report under the reports directory into
    /// `reports/LatestReport/`. Returns the copy's path, or None when no
    /// report has been produced yet.
    pub fn promote_latest_report(&self) -> EnsayoResult<Option<PathBuf>> {
        let reports = self.reports_dir();
        if !reports.exists() {
            return Ok(None);
        }
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        let mut stack = vec![reports.clone()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    if path.file_name().is_some_and(|n| n == "LatestReport") {
                        continue;
                    }
                    stack.push(path);
                } else if path.extension().is_some_and(|e| e == "html") {
                    let modified = entry.metadata()?.modified()?;
                    if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                        newest = Some((modified, path));
                    }
                }
            }
        }
        let Some((_, source)) = newest else {
            return Ok(None);
        };
        let latest_dir = reports.join("LatestReport");
        std::fs::create_dir_all(&latest_dir)?;
        let target = latest_dir.join("Report.html");
        std::fs::copy(&source, &target)
            .map_err(|e| EnsayoError::config(format!("failed to copy latest report: {e}")))?;
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> (tempfile::TempDir, ArtifactPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path().join("ensayo"));
        (dir, paths)
    }

    #[test]
    fn test_prepare_creates_layout() {
        let (_guard, paths) = paths();
        paths.prepare().unwrap();
        assert!(paths.run_screenshot_dir().is_dir());
        assert!(paths.latest_screenshot_dir().is_dir());
        assert!(paths.videos_dir().is_dir());
        assert!(paths.traces_dir().is_dir());
    }

    #[test]
    fn test_prepare_clears_latest_dir() {
        let (_guard, paths) = paths();
        paths.prepare().unwrap();
        let stale = paths.latest_screenshot_dir().join("old.png");
        std::fs::write(&stale, b"png").unwrap();
        paths.prepare().unwrap();
        assert!(!stale.exists());
        assert!(paths.latest_screenshot_dir().is_dir());
    }

    #[test]
    fn test_video_dirs_are_unique_per_session() {
        let (_guard, paths) = paths();
        paths.prepare().unwrap();
        let a = paths.video_dir_for("login").unwrap();
        let b = paths.video_dir_for("login").unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
    }

    #[test]
    fn test_save_screenshot_writes_both_copies() {
        let (_guard, paths) = paths();
        paths.prepare().unwrap();
        let shot = Screenshot::new(vec![1, 2, 3], false);
        let saved = paths.save_screenshot(&shot, "login failed!").unwrap();
        assert!(saved.exists());
        let latest: Vec<_> = std::fs::read_dir(paths.latest_screenshot_dir())
            .unwrap()
            .collect();
        assert_eq!(latest.len(), 1);
    }

    #[test]
    fn test_finalize_recording_renames_newest() {
        let (_guard, paths) = paths();
        paths.prepare().unwrap();
        let session_dir = paths.video_dir_for("checkout").unwrap();
        std::fs::write(session_dir.join("recording.webm"), b"webm").unwrap();
        let renamed = paths
            .finalize_recording(&session_dir, "checkout")
            .unwrap()
            .unwrap();
        assert!(renamed.file_name().unwrap().to_str().unwrap().starts_with("checkout_"));
        assert!(!session_dir.join("recording.webm").exists());
    }

    #[test]
    fn test_finalize_recording_empty_dir_is_none() {
        let (_guard, paths) = paths();
        paths.prepare().unwrap();
        let session_dir = paths.video_dir_for("empty").unwrap();
        assert!(paths.finalize_recording(&session_dir, "empty").unwrap().is_none());
    }

    #[test]
    fn test_promote_latest_report() {
        let (_guard, paths) = paths();
        paths.prepare().unwrap();
        std::fs::write(paths.reports_dir().join("run1.html"), b"<html/>").unwrap();
        let copy = paths.promote_latest_report().unwrap().unwrap();
        assert!(copy.ends_with("LatestReport/Report.html"));
        assert!(copy.exists());
    }
}
