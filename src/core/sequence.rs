//! Frame-sequence discovery for a version's path pattern.
//!
//! # Detection
//!
//! 1. Replace the frame token with `*` and glob
//! 2. Split each match into `(prefix, frame, ext)` using the trailing digits of the stem
//! 3. Group by `(prefix, ext)`, keep the first group in path order
//! 4. Compute first/last frame and any gaps inside the span
//!
//! Range display is `first-last`, or `[first-last], missing 4, 7-9` when
//! frames are absent inside the span.

use log::{debug, trace};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::entities::{ShotLayout, VersionAttrs};
use crate::error::{FlipbookError, Result};

/// Shown in place of a range when no frames exist.
pub const INVALID_SEQUENCE: &str = "Invalid Sequence";

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceInfo {
    /// Pattern as probed (with the frame token).
    pub pattern: String,
    /// Existing frames in ascending frame order.
    pub frames: Vec<(i64, PathBuf)>,
    pub first_frame: i64,
    pub last_frame: i64,
    pub missing: Vec<i64>,
}

impl SequenceInfo {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn has_gaps(&self) -> bool {
        !self.missing.is_empty()
    }

    /// Representative frame: `frames[len / 2]`.
    pub fn middle_frame(&self) -> Option<&Path> {
        self.frames.get(self.frames.len() / 2).map(|(_, p)| p.as_path())
    }

    pub fn range_display(&self) -> String {
        if self.has_gaps() {
            format!(
                "[{}-{}], missing {}",
                self.first_frame,
                self.last_frame,
                compress_frames(&self.missing)
            )
        } else {
            format!("{}-{}", self.first_frame, self.last_frame)
        }
    }

    /// Copy frame range facts into stored attributes.
    pub fn apply_to(&self, attrs: &mut VersionAttrs) {
        attrs.first_frame = Some(self.first_frame);
        attrs.last_frame = Some(self.last_frame);
        attrs.range_display = Some(self.range_display());
    }
}

/// Probe the on-disk frames behind `pattern`.
pub fn probe(layout: &ShotLayout, pattern: &str) -> Result<SequenceInfo> {
    let glob_pattern = layout.to_glob(pattern);
    let entries = glob::glob(&glob_pattern)
        .map_err(|e| FlipbookError::UserInput(format!("Bad pattern {}: {}", glob_pattern, e)))?;

    let mut files: Vec<PathBuf> = entries.filter_map(|e| e.ok()).filter(|p| p.is_file()).collect();
    files.sort();
    trace!("{} candidate files for {}", files.len(), glob_pattern);

    // (prefix, ext) -> frame -> path, groups ordered by first path seen
    let mut groups: Vec<((String, String), BTreeMap<i64, PathBuf>)> = Vec::new();
    for path in files {
        let Some((prefix, frame, ext)) = split_frame_path(&path) else {
            continue;
        };
        let group_key = (prefix, ext);
        match groups.iter_mut().find(|(k, _)| *k == group_key) {
            Some((_, frames)) => {
                frames.insert(frame, path);
            }
            None => groups.push((group_key, BTreeMap::from([(frame, path)]))),
        }
    }

    let Some((_, frames)) = groups.into_iter().next() else {
        return Err(FlipbookError::NotFound(glob_pattern));
    };

    let frames: Vec<(i64, PathBuf)> = frames.into_iter().collect();
    let first_frame = frames[0].0;
    let last_frame = frames[frames.len() - 1].0;

    let mut missing = Vec::new();
    for pair in frames.windows(2) {
        missing.extend(pair[0].0 + 1..pair[1].0);
    }

    debug!(
        "Probed {}: {} frames {}..{} ({} missing)",
        pattern,
        frames.len(),
        first_frame,
        last_frame,
        missing.len()
    );

    Ok(SequenceInfo {
        pattern: pattern.to_string(),
        frames,
        first_frame,
        last_frame,
        missing,
    })
}

/// Split `/path/seq.0001.exr` into `("/path/seq.", 1, "exr")`.
fn split_frame_path(path: &Path) -> Option<(String, i64, String)> {
    let ext = path.extension()?.to_str()?.to_string();
    let stem = path.file_stem()?.to_str()?;

    let digit_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;

    let frame = stem[digit_start..].parse::<i64>().ok()?;
    let mut prefix = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !prefix.is_empty() && !prefix.ends_with(std::path::MAIN_SEPARATOR) {
        prefix.push(std::path::MAIN_SEPARATOR);
    }
    prefix.push_str(&stem[..digit_start]);

    Some((prefix, frame, ext))
}

/// `[4, 7, 8, 9]` -> `"4, 7-9"`
fn compress_frames(frames: &[i64]) -> String {
    let mut parts = Vec::new();
    let mut iter = frames.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}-{}", start, end));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_frames(dir: &Path, stem: &str, frames: &[i64]) {
        for f in frames {
            fs::write(dir.join(format!("{}.{:04}.exr", stem, f)), b"frame").unwrap();
        }
    }

    fn pattern(dir: &Path, stem: &str) -> String {
        dir.join(format!("{}.$F4.exr", stem))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_gap_reported() {
        let tmp = TempDir::new().unwrap();
        let layout = ShotLayout::new(tmp.path(), "$F4", "exr");
        write_frames(tmp.path(), "a_v001", &[1, 2, 3, 5, 6]);

        let seq = probe(&layout, &pattern(tmp.path(), "a_v001")).unwrap();
        assert_eq!(seq.first_frame, 1);
        assert_eq!(seq.last_frame, 6);
        assert_eq!(seq.missing, vec![4]);
        assert_eq!(seq.range_display(), "[1-6], missing 4");
    }

    #[test]
    fn test_contiguous_range() {
        let tmp = TempDir::new().unwrap();
        let layout = ShotLayout::new(tmp.path(), "$F4", "exr");
        write_frames(tmp.path(), "a_v001", &(1001..=1010).collect::<Vec<_>>());

        let seq = probe(&layout, &pattern(tmp.path(), "a_v001")).unwrap();
        assert_eq!(seq.range_display(), "1001-1010");
        assert_eq!(seq.len(), 10);
        assert!(
            seq.middle_frame()
                .unwrap()
                .to_string_lossy()
                .ends_with("a_v001.1006.exr")
        );
    }

    #[test]
    fn test_single_frame_middle() {
        let tmp = TempDir::new().unwrap();
        let layout = ShotLayout::new(tmp.path(), "$F4", "exr");
        write_frames(tmp.path(), "a_v001", &[42]);

        let seq = probe(&layout, &pattern(tmp.path(), "a_v001")).unwrap();
        assert_eq!(seq.range_display(), "42-42");
        assert!(seq.middle_frame().unwrap().ends_with("a_v001.0042.exr"));
    }

    #[test]
    fn test_glob_metacharacters_in_root() {
        let tmp = TempDir::new().unwrap();
        for root in ["shots[old]", "shot[", "what?"] {
            let dir = tmp.path().join(root).join("anim").join("anim_v001");
            fs::create_dir_all(&dir).unwrap();
            write_frames(&dir, "anim_v001", &[1, 2, 3]);

            let layout = ShotLayout::new(tmp.path().join(root), "$F4", "exr");
            let seq = probe(&layout, &pattern(&dir, "anim_v001")).unwrap();
            assert_eq!(seq.range_display(), "1-3", "root {root}");
        }
    }

    #[test]
    fn test_no_files_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let layout = ShotLayout::new(tmp.path(), "$F4", "exr");
        let err = probe(&layout, &pattern(tmp.path(), "a_v001")).unwrap_err();
        assert!(matches!(err, FlipbookError::NotFound(_)));
    }

    #[test]
    fn test_other_versions_ignored() {
        let tmp = TempDir::new().unwrap();
        let layout = ShotLayout::new(tmp.path(), "$F4", "exr");
        write_frames(tmp.path(), "a_v001", &[1, 2]);
        write_frames(tmp.path(), "a_v002", &[10, 11, 12]);

        let seq = probe(&layout, &pattern(tmp.path(), "a_v002")).unwrap();
        assert_eq!((seq.first_frame, seq.last_frame), (10, 12));
    }

    #[test]
    fn test_compress_frames() {
        assert_eq!(compress_frames(&[4]), "4");
        assert_eq!(compress_frames(&[4, 7, 8, 9]), "4, 7-9");
        assert_eq!(compress_frames(&[1, 2, 5, 7]), "1-2, 5, 7");
    }

    #[test]
    fn test_apply_to_attrs() {
        let seq = SequenceInfo {
            pattern: "p".into(),
            frames: vec![(1, "a.0001.exr".into()), (3, "a.0003.exr".into())],
            first_frame: 1,
            last_frame: 3,
            missing: vec![2],
        };
        let mut attrs = VersionAttrs::default();
        seq.apply_to(&mut attrs);
        assert_eq!(attrs.frame_range(), Some((1, 3)));
        assert_eq!(attrs.range_display.as_deref(), Some("[1-3], missing 2"));
    }
}
