//! Shot directory layout and frame-path templating.
//!
//! ```text
//! <root>/<name>/<name>_data.json
//! <root>/<name>/<name>_v001/<name>_v001.$F4.exr
//! <root>/<name>/publish/
//! ```

use std::path::{Path, PathBuf};

use super::version::VersionKey;
use crate::error::{FlipbookError, Result};

/// Characters that may not appear in a flipbook name.
const FORBIDDEN_NAME_CHARS: &str = "[~!@#$%^&*() +{}\":;']./\\";

#[derive(Debug, Clone)]
pub struct ShotLayout {
    root: PathBuf,
    frame_token: String,
    frame_ext: String,
}

impl ShotLayout {
    pub fn new(root: impl Into<PathBuf>, frame_token: &str, frame_ext: &str) -> Self {
        Self {
            root: root.into(),
            frame_token: frame_token.to_string(),
            frame_ext: frame_ext.trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frame_token(&self) -> &str {
        &self.frame_token
    }

    pub fn name_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn version_dir(&self, key: &VersionKey) -> PathBuf {
        self.name_dir(&key.name).join(key.to_string())
    }

    /// Frame path with the placeholder token, e.g. `.../a_v001/a_v001.$F4.exr`.
    pub fn frame_pattern(&self, key: &VersionKey) -> String {
        self.version_dir(key)
            .join(format!("{}.{}.{}", key, self.frame_token, self.frame_ext))
            .to_string_lossy()
            .into_owned()
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.name_dir(name).join(format!("{}_data.json", name))
    }

    pub fn publish_dir(&self, name: &str) -> PathBuf {
        self.name_dir(name).join("publish")
    }

    /// Recognise `<root>/<name>/<name>_vNNN`.
    pub fn parse_version_dir(&self, dir: &Path) -> Option<VersionKey> {
        let basename = dir.file_name()?.to_str()?;
        let key = VersionKey::parse(basename)?;
        let parent = dir.parent()?;
        let parent_name = parent.file_name()?.to_str()?;
        (parent_name == key.name && parent.parent() == Some(self.root.as_path())).then_some(key)
    }

    /// Zero padding implied by the token (`$F4` → 4, `$F` → 1).
    pub fn padding(&self) -> usize {
        let digits: String = self
            .frame_token
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        match digits.chars().rev().collect::<String>().parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ if self.frame_token.contains('#') => self.frame_token.matches('#').count(),
            _ => 1,
        }
    }

    /// Replace the token with `*` for file discovery. The rest of the
    /// pattern is escaped, so `[`, `]` and `?` in paths match literally.
    pub fn to_glob(&self, pattern: &str) -> String {
        pattern
            .split(self.frame_token.as_str())
            .map(glob::Pattern::escape)
            .collect::<Vec<_>>()
            .join("*")
    }

    /// Replace the token with `####` (clipboard / hand-off form).
    pub fn to_hashes(&self, pattern: &str) -> String {
        pattern.replace(&self.frame_token, &"#".repeat(self.padding()))
    }

    /// Replace the token with `%04d` (encoder input form).
    pub fn to_printf(&self, pattern: &str) -> String {
        pattern.replace(&self.frame_token, &format!("%0{}d", self.padding()))
    }

    /// Concrete path of one frame.
    pub fn frame_path(&self, pattern: &str, frame: i64) -> PathBuf {
        PathBuf::from(pattern.replace(
            &self.frame_token,
            &format!("{:0width$}", frame, width = self.padding()),
        ))
    }
}

/// Reject names that would break paths or the host's expression syntax.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(FlipbookError::UserInput("Incorrect flipbook name!".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ShotLayout {
        ShotLayout::new("/shots/sh010", "$F4", "exr")
    }

    #[test]
    fn test_paths() {
        let l = layout();
        let key = VersionKey::new("turnaround", 2);
        assert_eq!(
            l.version_dir(&key),
            PathBuf::from("/shots/sh010/turnaround/turnaround_v002")
        );
        assert_eq!(
            l.frame_pattern(&key),
            "/shots/sh010/turnaround/turnaround_v002/turnaround_v002.$F4.exr"
        );
        assert_eq!(
            l.data_file("turnaround"),
            PathBuf::from("/shots/sh010/turnaround/turnaround_data.json")
        );
    }

    #[test]
    fn test_token_forms() {
        let l = layout();
        let p = "/x/a_v001.$F4.exr";
        assert_eq!(l.to_glob(p), "/x/a_v001.*.exr");
        assert_eq!(l.to_hashes(p), "/x/a_v001.####.exr");
        assert_eq!(l.to_printf(p), "/x/a_v001.%04d.exr");
        assert_eq!(l.frame_path(p, 12), PathBuf::from("/x/a_v001.0012.exr"));
    }

    #[test]
    fn test_glob_escapes_literal_brackets() {
        let l = ShotLayout::new("/shots[old]", "$F4", "exr");
        let p = "/shots[old]/a/a_v001/a_v001.$F4.exr";
        assert_eq!(l.to_glob(p), "/shots[[]old[]]/a/a_v001/a_v001.*.exr");
        assert_eq!(ShotLayout::new("/r", "$F4", "exr").to_glob("/r/what?.$F4.exr"), "/r/what[?].*.exr");
    }

    #[test]
    fn test_padding_variants() {
        assert_eq!(ShotLayout::new("/r", "$F", "exr").padding(), 1);
        assert_eq!(ShotLayout::new("/r", "####", "exr").padding(), 4);
        assert_eq!(ShotLayout::new("/r", "$F6", "exr").padding(), 6);
    }

    #[test]
    fn test_parse_version_dir() {
        let l = layout();
        let ok = PathBuf::from("/shots/sh010/turnaround/turnaround_v003");
        assert_eq!(l.parse_version_dir(&ok), Some(VersionKey::new("turnaround", 3)));

        let wrong_parent = PathBuf::from("/shots/sh010/other/turnaround_v003");
        assert!(l.parse_version_dir(&wrong_parent).is_none());

        let too_deep = PathBuf::from("/shots/sh010/x/turnaround/turnaround_v003");
        assert!(l.parse_version_dir(&too_deep).is_none());

        // would resolve back to turnaround_v003, a different directory
        let wide = PathBuf::from("/shots/sh010/turnaround/turnaround_v0003");
        assert!(l.parse_version_dir(&wide).is_none());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("turnaround").is_ok());
        assert!(validate_name("fx_vol-2").is_ok());
        for bad in ["", "a b", "a.b", "a$b", "a/b", "x;y", "q'r"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
