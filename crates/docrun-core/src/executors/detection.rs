//! Static side-effect detection over example source.
//!
//! A case-insensitive substring scan, not a filesystem diff. Comments that
//! mention `mkdir` are flagged; redirections built inside strings are missed.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideEffectKind {
    CreatesFiles,
    CreatesDirectories,
    DownloadsContent,
    ClonesRepository,
}

impl SideEffectKind {
    pub const ALL: [SideEffectKind; 4] = [
        SideEffectKind::CreatesFiles,
        SideEffectKind::CreatesDirectories,
        SideEffectKind::DownloadsContent,
        SideEffectKind::ClonesRepository,
    ];

    /// Metadata key used on `TestResult` and side-effect resources.
    pub fn key(&self) -> &'static str {
        match self {
            SideEffectKind::CreatesFiles => "creates_files",
            SideEffectKind::CreatesDirectories => "creates_directories",
            SideEffectKind::DownloadsContent => "downloads_content",
            SideEffectKind::ClonesRepository => "clones_repository",
        }
    }

    fn tokens(&self) -> &'static [&'static str] {
        match self {
            SideEffectKind::CreatesFiles => &["touch ", " >", ">>"],
            SideEffectKind::CreatesDirectories => &["mkdir"],
            SideEffectKind::DownloadsContent => &["wget ", "curl "],
            SideEffectKind::ClonesRepository => &["git clone"],
        }
    }
}

/// Kinds whose tokens appear in `code`, in `SideEffectKind::ALL` order.
pub fn scan(code: &str) -> Vec<SideEffectKind> {
    let lowered = code.to_lowercase();
    SideEffectKind::ALL
        .into_iter()
        .filter(|kind| kind.tokens().iter().any(|token| lowered.contains(token)))
        .collect()
}

/// One `"true"`/`"false"` entry per kind.
pub fn as_metadata(detected: &[SideEffectKind]) -> HashMap<String, String> {
    SideEffectKind::ALL
        .into_iter()
        .map(|kind| (kind.key().to_string(), detected.contains(&kind).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_echo_has_no_side_effects() {
        assert!(scan("echo hello").is_empty());
    }

    #[test]
    fn test_each_category_detected() {
        assert_eq!(scan("touch notes.txt"), vec![SideEffectKind::CreatesFiles]);
        assert_eq!(scan("echo hi > out.txt"), vec![SideEffectKind::CreatesFiles]);
        assert_eq!(scan("echo hi >>log"), vec![SideEffectKind::CreatesFiles]);
        assert_eq!(scan("MKDIR -p build"), vec![SideEffectKind::CreatesDirectories]);
        assert_eq!(scan("curl https://example.com"), vec![SideEffectKind::DownloadsContent]);
        assert_eq!(scan("WGET https://example.com"), vec![SideEffectKind::DownloadsContent]);
        assert_eq!(scan("git clone https://x/y.git"), vec![SideEffectKind::ClonesRepository]);
    }

    #[test]
    fn test_comment_is_a_known_false_positive() {
        assert_eq!(scan("# no need to mkdir here"), vec![SideEffectKind::CreatesDirectories]);
    }

    #[test]
    fn test_metadata_has_every_flag() {
        let meta = as_metadata(&scan("mkdir a && touch a/b"));
        assert_eq!(meta.len(), 4);
        assert_eq!(meta["creates_files"], "true");
        assert_eq!(meta["creates_directories"], "true");
        assert_eq!(meta["downloads_content"], "false");
        assert_eq!(meta["clones_repository"], "false");
    }
}
