//! Enumerator: recursive directory walk, the single-threaded producer of
//! every `FileRef` in the engine arena (spec.md §4.1).

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use log::warn;

use crate::archive::ArchiveReader;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::fileref::{FileKind, FileRef};

/// One link in the `(device, inode)` ancestor chain consulted for symlink
/// loop detection when descending into a directory (spec.md §4.1 step 4;
/// spec.md §9 resolves the ambiguity there as "compare the current entry's
/// inode against each ancestor's inode").
#[derive(Clone, Copy, PartialEq, Eq)]
struct Ancestor {
    dev: u64,
    ino: u64,
}

/// Walks every root in turn (spec.md §4.7 step 2: "sequential"). A root
/// argument that cannot be stat'd is fatal; anything encountered below it
/// is a per-entry failure that is logged and skipped instead.
pub fn enumerate_roots(engine: &mut Engine, roots: &[PathBuf]) -> EngineResult<()> {
    for root in roots {
        visit_root(engine, root)?;
    }
    Ok(())
}

fn visit_root(engine: &mut Engine, root: &Path) -> EngineResult<()> {
    let stat = resolve_stat(engine, root, fs::symlink_metadata(root).ok())
        .ok_or_else(|| EngineError::NotFound(root.to_path_buf()))?;

    if stat.is_dir() {
        let mut ancestors = vec![Ancestor { dev: stat.dev(), ino: stat.ino() }];
        walk_dir(engine, root, &mut ancestors)
    } else if stat.is_file() {
        consider_file(engine, root, &stat)
    } else {
        Ok(())
    }
}

/// Resolves the metadata to use for loop detection and permission checks:
/// the symlink's own metadata when not following symlinks, or the target's
/// metadata (re-stat'd) when following them. Returns `None` for a broken
/// symlink.
fn resolve_stat(engine: &Engine, path: &Path, symlink_meta: Option<fs::Metadata>) -> Option<fs::Metadata> {
    let symlink_meta = symlink_meta?;
    if !symlink_meta.file_type().is_symlink() {
        return Some(symlink_meta);
    }
    if !engine.config.follow_symlinks {
        return None;
    }
    match fs::metadata(path) {
        Ok(m) => Some(m),
        Err(_) => {
            warn!("broken symlink: {}", path.display());
            None
        }
    }
}

fn walk_dir(engine: &mut Engine, dir: &Path, ancestors: &mut Vec<Ancestor>) -> EngineResult<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("failed to open directory {}: {e}", dir.display());
            return Ok(());
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to read entry in {}: {e}", dir.display());
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if engine.filter.skip_by_name(&name) {
            continue;
        }

        let path = entry.path();
        let Some(stat) = resolve_stat(engine, &path, fs::symlink_metadata(&path).ok()) else {
            continue;
        };

        if stat.is_dir() {
            if !has_read_permission(&stat) || !has_execute_permission(&stat) {
                continue;
            }
            if !engine.config.recurse {
                continue;
            }
            let anc = Ancestor { dev: stat.dev(), ino: stat.ino() };
            if ancestors.contains(&anc) {
                warn!("symlink loop detected at {}, not descending", path.display());
                continue;
            }
            ancestors.push(anc);
            walk_dir(engine, &path, ancestors)?;
            ancestors.pop();
            continue;
        }

        if !stat.is_file() {
            continue;
        }
        if !has_read_permission(&stat) {
            continue;
        }

        consider_file(engine, &path, &stat)?;
    }
    Ok(())
}

/// Applies steps 5-8 of spec.md §4.1 to one regular file: blacklist then
/// whitelist regex, archive expansion, the size gate, and `FileRef`
/// construction.
fn consider_file(engine: &mut Engine, path: &Path, stat: &fs::Metadata) -> EngineResult<()> {
    let path_str = path.to_string_lossy();
    if !engine.filter.allows_path(&path_str) {
        return Ok(());
    }

    if engine.config.untar && has_archive_extension(path) {
        return expand_archive(engine, path);
    }

    let size = stat.len() as i64;
    if !passes_size_gate(engine, size) {
        return Ok(());
    }

    let prioritised = is_prioritised(path, engine.config.priority_path.as_deref());
    let file = FileRef::new(
        path.to_path_buf(),
        FileKind::Plain,
        size,
        to_micros(stat.mtime(), stat.mtime_nsec()),
        to_micros(stat.ctime(), stat.ctime_nsec()),
        prioritised,
    );
    engine.alloc_file(file);
    Ok(())
}

/// spec.md §4.1 step 6: opens the archive, iterates members, and produces
/// one `FileRef` per member. A malformed archive after at least one valid
/// header is the one enumerator failure that aborts the walk (spec.md
/// §4.1, "Failure semantics"); `ArchiveExtractor::members` already returns
/// an empty list, not an error, for the before-first-header case.
fn expand_archive(engine: &mut Engine, path: &Path) -> EngineResult<()> {
    let members = engine.archive.members(path)?;
    let prioritised = is_prioritised(path, engine.config.priority_path.as_deref());

    for member in members {
        if !passes_size_gate(engine, member.size) {
            continue;
        }
        let file = FileRef::new(
            path.to_path_buf(),
            FileKind::ArchiveMember { subpath: member.subpath },
            member.size,
            member.mtime,
            member.mtime,
            prioritised,
        );
        engine.alloc_file(file);
    }
    Ok(())
}

fn passes_size_gate(engine: &Engine, size: i64) -> bool {
    if size < engine.config.min_size {
        return false;
    }
    if engine.config.max_size > 0 && size > engine.config.max_size {
        return false;
    }
    true
}

fn has_archive_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("tar")).unwrap_or(false)
}

fn is_prioritised(path: &Path, priority_path: Option<&Path>) -> bool {
    priority_path.map(|p| path.starts_with(p)).unwrap_or(false)
}

fn to_micros(secs: i64, nsec: i64) -> i64 {
    secs * 1_000_000 + nsec / 1_000
}

/// Permission gate (spec.md §4.1 step 2): computed from the effective
/// uid/gid (and supplementary group list) against the entry's owner/group/
/// other mode bits. The superuser bypasses the check, matching ordinary
/// POSIX access semantics.
fn has_read_permission(meta: &fs::Metadata) -> bool {
    has_permission(meta, 0o400, 0o040, 0o004)
}

fn has_execute_permission(meta: &fs::Metadata) -> bool {
    has_permission(meta, 0o100, 0o010, 0o001)
}

fn has_permission(meta: &fs::Metadata, owner_bit: u32, group_bit: u32, other_bit: u32) -> bool {
    let mode = meta.mode();
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        return true;
    }
    if meta.uid() == euid {
        return mode & owner_bit != 0;
    }
    if group_matches(meta.gid()) {
        return mode & group_bit != 0;
    }
    mode & other_bit != 0
}

fn group_matches(file_gid: u32) -> bool {
    let egid = unsafe { libc::getegid() };
    if egid == file_gid {
        return true;
    }
    let mut groups = vec![0u32; 64];
    let n = unsafe { libc::getgroups(groups.len() as i32, groups.as_mut_ptr()) };
    if n < 0 {
        return false;
    }
    groups[..n as usize].iter().any(|&g| g == file_gid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::fs::{self as stdfs, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn engine_with(config: EngineConfig) -> Engine {
        Engine::new(config).unwrap()
    }

    #[test]
    fn enumerates_plain_files_under_a_root() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.txt")).unwrap().write_all(b"hello").unwrap();
        File::create(dir.path().join("b.txt")).unwrap().write_all(b"hello").unwrap();

        let mut engine = engine_with(EngineConfig { roots: vec![dir.path().to_path_buf()], ..EngineConfig::default() });
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(engine.arena.len(), 2);
        assert!(engine.arena.iter().all(|f| f.size == 5));
    }

    #[test]
    fn hidden_files_are_skipped_by_default() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join(".hidden")).unwrap().write_all(b"x").unwrap();
        File::create(dir.path().join("visible")).unwrap().write_all(b"x").unwrap();

        let mut engine = engine_with(EngineConfig::default());
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(engine.arena.len(), 1);
        assert_eq!(engine.arena[0].path.file_name().unwrap(), "visible");
    }

    #[test]
    fn show_hidden_includes_dotfiles() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join(".hidden")).unwrap().write_all(b"x").unwrap();

        let mut engine = engine_with(EngineConfig { show_hidden: true, ..EngineConfig::default() });
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();
        assert_eq!(engine.arena.len(), 1);
    }

    #[test]
    fn recurse_false_does_not_descend_into_subdirectories() {
        let dir = tempdir().unwrap();
        stdfs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub/nested.txt")).unwrap().write_all(b"x").unwrap();
        File::create(dir.path().join("top.txt")).unwrap().write_all(b"x").unwrap();

        let mut engine = engine_with(EngineConfig { recurse: false, ..EngineConfig::default() });
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(engine.arena.len(), 1);
        assert_eq!(engine.arena[0].path.file_name().unwrap(), "top.txt");
    }

    #[test]
    fn size_gate_excludes_files_outside_the_range() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("small")).unwrap().write_all(b"x").unwrap();
        File::create(dir.path().join("big")).unwrap().write_all(&vec![b'x'; 100]).unwrap();

        let mut engine = engine_with(EngineConfig { min_size: 10, ..EngineConfig::default() });
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(engine.arena.len(), 1);
        assert_eq!(engine.arena[0].path.file_name().unwrap(), "big");
    }

    #[test]
    fn ignore_names_skip_matching_entries() {
        let dir = tempdir().unwrap();
        stdfs::create_dir(dir.path().join("target")).unwrap();
        File::create(dir.path().join("target/built.bin")).unwrap().write_all(b"x").unwrap();
        File::create(dir.path().join("src.rs")).unwrap().write_all(b"x").unwrap();

        let mut engine = engine_with(EngineConfig {
            ignore_names: vec!["target".to_string()],
            ..EngineConfig::default()
        });
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(engine.arena.len(), 1);
        assert_eq!(engine.arena[0].path.file_name().unwrap(), "src.rs");
    }

    #[test]
    fn priority_path_flag_is_set_for_files_under_it() {
        let dir = tempdir().unwrap();
        stdfs::create_dir(dir.path().join("priority")).unwrap();
        File::create(dir.path().join("priority/p.txt")).unwrap().write_all(b"x").unwrap();
        File::create(dir.path().join("other.txt")).unwrap().write_all(b"x").unwrap();

        let mut engine = engine_with(EngineConfig {
            priority_path: Some(dir.path().join("priority")),
            ..EngineConfig::default()
        });
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();

        let prioritised: Vec<_> = engine.arena.iter().filter(|f| f.prioritised).collect();
        assert_eq!(prioritised.len(), 1);
        assert_eq!(prioritised[0].path.file_name().unwrap(), "p.txt");
    }

    #[test]
    fn untar_expands_archive_members_into_filerefs() {
        use tar::{Builder, Header};

        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("bundle.tar");
        {
            let file = File::create(&archive_path).unwrap();
            let mut builder = Builder::new(file);
            for (name, contents) in [("a.txt", "identical content"), ("b.txt", "identical content")] {
                let mut header = Header::new_gnu();
                header.set_size(contents.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, contents.as_bytes()).unwrap();
            }
            builder.finish().unwrap();
        }

        let mut engine = engine_with(EngineConfig { untar: true, ..EngineConfig::default() });
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(engine.arena.len(), 2);
        assert!(engine.arena.iter().all(|f| f.is_archive_member()));
    }

    #[test]
    fn without_untar_archive_files_are_treated_as_opaque_blobs() {
        use tar::{Builder, Header};

        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("bundle.tar");
        {
            let file = File::create(&archive_path).unwrap();
            let mut builder = Builder::new(file);
            let mut header = Header::new_gnu();
            header.set_size(5);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "a.txt", "hello".as_bytes()).unwrap();
            builder.finish().unwrap();
        }

        let mut engine = engine_with(EngineConfig::default());
        enumerate_roots(&mut engine, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(engine.arena.len(), 1);
        assert!(!engine.arena[0].is_archive_member());
    }

    #[test]
    fn missing_root_is_a_fatal_not_found() {
        let mut engine = engine_with(EngineConfig::default());
        let err = enumerate_roots(&mut engine, &[PathBuf::from("/no/such/path/at/all")]);
        assert!(matches!(err, Err(EngineError::NotFound(_))));
    }
}
