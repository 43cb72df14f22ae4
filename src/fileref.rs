//! `FileRef`: an opaque descriptor of a candidate file, arena-allocated by
//! the `Engine` and addressed by index (`FileId`) everywhere else. The
//! archive-subpath field from spec.md's `FileRef` is modeled as a tagged
//! variant rather than an always-present optional field, per the REDESIGN
//! FLAGS in spec.md §9 ("opaque handles with optional fields").

use std::path::PathBuf;

/// Index into the engine's `FileRef` arena. Stable for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// A plain file reachable directly by `path`.
    Plain,
    /// A member of an archive at `path`, with its own logical subpath.
    ArchiveMember { subpath: String },
}

#[derive(Debug, Clone)]
pub struct FileRef {
    pub path: PathBuf,
    pub kind: FileKind,
    pub size: i64,
    /// Microseconds since epoch.
    pub mtime: i64,
    /// Microseconds since epoch.
    pub ctime: i64,
    /// Set when this path is under the user-specified priority root.
    pub prioritised: bool,
}

impl FileRef {
    pub fn new(
        path: PathBuf,
        kind: FileKind,
        size: i64,
        mtime: i64,
        ctime: i64,
        prioritised: bool,
    ) -> Self {
        Self { path, kind, size, mtime, ctime, prioritised }
    }

    pub fn is_archive_member(&self) -> bool {
        matches!(self.kind, FileKind::ArchiveMember { .. })
    }

    /// The logical cache key: `path` for plain files, `path:subpath` for
    /// archive members (see spec.md §4.2, "Archive members").
    pub fn cache_key(&self) -> String {
        match &self.kind {
            FileKind::Plain => self.path.to_string_lossy().into_owned(),
            FileKind::ArchiveMember { subpath } => {
                format!("{}:{}", self.path.to_string_lossy(), subpath)
            }
        }
    }

    /// The path as printed by the reporter: `archive<sep>member` for archive
    /// members, using `|` instead of `:` when the record separator itself is
    /// `:` (spec.md §4.4, "Header emission").
    pub fn display_path(&self, record_sep: char) -> String {
        match &self.kind {
            FileKind::Plain => self.path.to_string_lossy().into_owned(),
            FileKind::ArchiveMember { subpath } => {
                let sep = if record_sep == ':' { '|' } else { ':' };
                format!("{}{}{}", self.path.to_string_lossy(), sep, subpath)
            }
        }
    }
}
