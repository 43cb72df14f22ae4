//! `ArchiveExtractor`: tar-backed archive member iteration and materialization
//! (spec.md §4.1 step 6, §4.2 "Archive members").

use std::fs::File;
use std::io::copy;
use std::path::{Path, PathBuf};

use tar::Archive;
use tempfile::NamedTempFile;

use crate::error::{EngineError, EngineResult};
use crate::fileref::{FileKind, FileRef};

/// One member discovered while iterating an archive.
pub struct ArchiveMember {
    pub subpath: String,
    pub size: i64,
    pub mtime: i64,
}

/// Capability the Enumerator and the fingerprint engine consume to expand
/// and materialize tar archives. `ArchiveExtractor` is the only
/// implementation; the trait exists so the engine never references `tar`
/// directly (spec.md presents this purely as an external collaborator).
pub trait ArchiveReader {
    fn members(&self, archive_path: &Path) -> EngineResult<Vec<ArchiveMember>>;
    fn extract_to_scratch(&self, archive_path: &Path, subpath: &str) -> EngineResult<NamedTempFile>;
}

#[derive(Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveReader for ArchiveExtractor {
    /// Lists every member of `archive_path`. A malformed header found before
    /// any valid header is silently skipped (empty result); one found after
    /// at least one valid header is a hard `ArchiveError` (spec.md §4.1,
    /// "Failure semantics").
    fn members(&self, archive_path: &Path) -> EngineResult<Vec<ArchiveMember>> {
        let file = File::open(archive_path).map_err(|e| EngineError::io(archive_path, e))?;
        let mut archive = Archive::new(file);
        let mut out = Vec::new();

        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(_) => return Ok(out),
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if out.is_empty() {
                        return Ok(out);
                    }
                    return Err(EngineError::Archive {
                        path: archive_path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            };
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let subpath = entry.path().map_err(|e| EngineError::Archive {
                path: archive_path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let size = entry.header().size().unwrap_or(0) as i64;
            let mtime = entry.header().mtime().unwrap_or(0) as i64 * 1_000_000;
            out.push(ArchiveMember { subpath: subpath.to_string_lossy().into_owned(), size, mtime });
        }
        Ok(out)
    }

    /// Materializes `subpath` from `archive_path` to a scratch file under
    /// `std::env::temp_dir()` so the fingerprint engine and verifier can
    /// treat it like any other file (spec.md §4.2, "Archive members").
    fn extract_to_scratch(&self, archive_path: &Path, subpath: &str) -> EngineResult<NamedTempFile> {
        let file = File::open(archive_path).map_err(|e| EngineError::io(archive_path, e))?;
        let mut archive = Archive::new(file);
        let entries = archive.entries().map_err(|e| EngineError::Archive {
            path: archive_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            let mut entry = entry.map_err(|e| EngineError::Archive {
                path: archive_path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let entry_path = entry.path().map_err(|e| EngineError::Archive {
                path: archive_path.to_path_buf(),
                reason: e.to_string(),
            })?;
            if entry_path.to_string_lossy() != subpath {
                continue;
            }
            let mut scratch = NamedTempFile::new_in(std::env::temp_dir())
                .map_err(|e| EngineError::io(archive_path, e))?;
            copy(&mut entry, &mut scratch).map_err(|e| EngineError::io(archive_path, e))?;
            return Ok(scratch);
        }
        Err(EngineError::NotFound(PathBuf::from(subpath)))
    }
}

/// The file a plain path or archive member should actually be read from:
/// the path itself, or a materialized scratch file that is deleted when
/// this value is dropped (spec.md §4.2, "Archive members": "materialise the
/// member to a scratch file ... fingerprint that scratch file, and delete it
/// before returning").
pub enum ContentSource {
    Direct(PathBuf),
    Scratch(NamedTempFile),
}

impl ContentSource {
    pub fn path(&self) -> &Path {
        match self {
            ContentSource::Direct(p) => p.as_path(),
            ContentSource::Scratch(f) => f.path(),
        }
    }
}

/// Resolves `file` to a readable path: the plain path itself, or a freshly
/// materialized scratch copy of the archive member (spec.md §4.2). Callers
/// in the fingerprint engine and the verifier both go through this so
/// neither ever reads a tar file's own bytes as if it were the member.
pub fn resolve_content(archive: &dyn ArchiveReader, file: &FileRef) -> EngineResult<ContentSource> {
    match &file.kind {
        FileKind::Plain => Ok(ContentSource::Direct(file.path.clone())),
        FileKind::ArchiveMember { subpath } => {
            archive.extract_to_scratch(&file.path, subpath).map(ContentSource::Scratch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tar::{Builder, Header};

    fn build_test_archive() -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        {
            let mut builder = Builder::new(file.reopen().unwrap());
            for (name, contents) in [("a.txt", "identical content"), ("b.txt", "identical content")] {
                let mut header = Header::new_gnu();
                header.set_size(contents.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, contents.as_bytes()).unwrap();
            }
            builder.finish().unwrap();
        }
        file
    }

    #[test]
    fn lists_members_with_sizes() {
        let archive = build_test_archive();
        let extractor = ArchiveExtractor::new();
        let members = extractor.members(archive.path()).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].subpath, "a.txt");
        assert_eq!(members[0].size, 17);
    }

    #[test]
    fn extracts_member_content_to_scratch_file() {
        let archive = build_test_archive();
        let extractor = ArchiveExtractor::new();
        let mut scratch = extractor.extract_to_scratch(archive.path(), "a.txt").unwrap();
        let mut contents = String::new();
        scratch.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "identical content");
    }

    #[test]
    fn resolve_content_materializes_archive_members() {
        let archive = build_test_archive();
        let extractor = ArchiveExtractor::new();
        let file = FileRef::new(
            archive.path().to_path_buf(),
            FileKind::ArchiveMember { subpath: "a.txt".to_string() },
            17,
            0,
            0,
            false,
        );
        let source = resolve_content(&extractor, &file).unwrap();
        assert_ne!(source.path(), archive.path());
        let contents = std::fs::read_to_string(source.path()).unwrap();
        assert_eq!(contents, "identical content");
    }

    #[test]
    fn resolve_content_passes_plain_files_through_unchanged() {
        let plain = NamedTempFile::new().unwrap();
        let extractor = ArchiveExtractor::new();
        let file = FileRef::new(plain.path().to_path_buf(), FileKind::Plain, 0, 0, 0, false);
        let source = resolve_content(&extractor, &file).unwrap();
        assert_eq!(source.path(), plain.path());
    }

    #[test]
    fn missing_member_is_not_found() {
        let archive = build_test_archive();
        let extractor = ArchiveExtractor::new();
        assert!(extractor.extract_to_scratch(archive.path(), "missing.txt").is_err());
    }

    #[test]
    fn malformed_archive_with_no_valid_header_is_silently_empty() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not a tar file at all").unwrap();
        file.flush().unwrap();
        let extractor = ArchiveExtractor::new();
        let members = extractor.members(file.path()).unwrap();
        assert!(members.is_empty());
    }
}
