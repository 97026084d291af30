//! Filesystem access for folder sources.
//!
//! [`TreeWalker`] enumerates a source root one directory at a time,
//! yielding a [`DirListing`] per directory in depth-first pre-order with
//! entries sorted by name, the root first. Walking is lazy and can be
//! restarted by calling [`TreeWalker::walk`] again.
//!
//! The remaining helpers stat, hash and read individual files and derive
//! the document title and type tag from a path.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use kbsync_core::change::Observed;
use kbsync_core::hash::hash_reader;
use kbsync_core::models::Source;

/// A file discovered in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// POSIX path relative to the source root.
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// One directory and the files directly inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// POSIX path relative to the source root; empty for the root.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub depth: i64,
    pub files: Vec<FileEntry>,
    /// Entries left out because their names are not valid UTF-8, as
    /// lossy display paths.
    pub unreadable_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    recursive: bool,
    follow_symlinks: bool,
}

impl TreeWalker {
    pub fn new(root: impl Into<PathBuf>, recursive: bool, follow_symlinks: bool) -> Self {
        Self {
            root: root.into(),
            recursive,
            follow_symlinks,
        }
    }

    pub fn for_source(source: &Source) -> Self {
        Self::new(&source.root_path, source.recursive, source.follow_symlinks)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the root exists and is a directory (symlinks followed).
    pub fn root_exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Start a fresh walk. A missing root yields nothing.
    pub fn walk(&self) -> Walk {
        let mut walk = Walk {
            stack: Vec::new(),
            visited: HashSet::new(),
            recursive: self.recursive,
            follow_symlinks: self.follow_symlinks,
        };
        if self.root_exists() {
            if let Ok(canonical) = self.root.canonicalize() {
                walk.visited.insert(canonical);
            }
            walk.stack.push(Pending {
                abs_path: self.root.clone(),
                rel_path: String::new(),
                depth: 0,
            });
        }
        walk
    }
}

struct Pending {
    abs_path: PathBuf,
    rel_path: String,
    depth: i64,
}

/// Iterator returned by [`TreeWalker::walk`].
///
/// A directory that cannot be read yields an `Err` in its place; the walk
/// carries on with its siblings.
pub struct Walk {
    stack: Vec<Pending>,
    visited: HashSet<PathBuf>,
    recursive: bool,
    follow_symlinks: bool,
}

enum EntryKind {
    Dir,
    File,
    Skip,
}

impl Walk {
    fn kind_of(&mut self, entry: &walkdir::DirEntry) -> EntryKind {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            if self.follow_symlinks {
                return self.first_visit(entry.path());
            }
            return EntryKind::Dir;
        }
        if file_type.is_file() {
            return EntryKind::File;
        }
        if !file_type.is_symlink() {
            return EntryKind::Skip;
        }

        // Broken links stay files so the stat failure gets reported.
        let target_is_dir = fs::metadata(entry.path())
            .map(|m| m.is_dir())
            .unwrap_or(false);
        match (target_is_dir, self.follow_symlinks) {
            (false, _) => EntryKind::File,
            (true, false) => EntryKind::Skip,
            (true, true) => self.first_visit(entry.path()),
        }
    }

    fn first_visit(&mut self, path: &Path) -> EntryKind {
        match path.canonicalize() {
            Ok(canonical) => {
                if self.visited.insert(canonical) {
                    EntryKind::Dir
                } else {
                    EntryKind::Skip
                }
            }
            Err(_) => EntryKind::Skip,
        }
    }

    fn list(&mut self, dir: Pending) -> Result<DirListing> {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        let mut unreadable_names = Vec::new();

        let entries = WalkDir::new(&dir.abs_path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("Failed to read directory: {}", dir.abs_path.display()))?;
            let join = |name: &str| {
                if dir.rel_path.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", dir.rel_path, name)
                }
            };
            let rel_path = match entry.file_name().to_str() {
                Some(name) => join(name),
                None => {
                    unreadable_names.push(join(&entry.file_name().to_string_lossy()));
                    continue;
                }
            };
            match self.kind_of(&entry) {
                EntryKind::File => files.push(FileEntry {
                    rel_path,
                    abs_path: entry.path().to_path_buf(),
                }),
                EntryKind::Dir if self.recursive => subdirs.push(Pending {
                    abs_path: entry.path().to_path_buf(),
                    rel_path,
                    depth: dir.depth + 1,
                }),
                EntryKind::Dir | EntryKind::Skip => {}
            }
        }

        // Reverse so the smallest name is popped next.
        self.stack.extend(subdirs.into_iter().rev());

        Ok(DirListing {
            rel_path: dir.rel_path,
            abs_path: dir.abs_path,
            depth: dir.depth,
            files,
            unreadable_names,
        })
    }
}

impl Iterator for Walk {
    type Item = Result<DirListing>;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.stack.pop()?;
        Some(self.list(dir))
    }
}

/// Size and modification time of `path`, following symlinks.
pub fn stat_file(path: &Path) -> Result<Observed> {
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to stat file: {}", path.display()))?;
    let modified = metadata
        .modified()
        .with_context(|| format!("No modification time for: {}", path.display()))?;
    let mtime_epoch = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    };
    Ok(Observed {
        size_bytes: metadata.len() as i64,
        mtime_epoch,
    })
}

/// SHA-256 of the file's bytes, streamed.
pub fn hash_file(path: &Path) -> Result<String> {
    let file =
        fs::File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    hash_reader(file).with_context(|| format!("Failed to hash file: {}", path.display()))
}

/// File contents decoded as UTF-8, with invalid sequences replaced.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Lower-cased extension without the dot.
pub fn extension_of(rel_path: &str) -> Option<String> {
    Path::new(rel_path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
}

/// Document title: the file name without its extension.
pub fn title_of(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| rel_path.to_string())
}

/// Document type tag derived from the extension.
pub fn doc_type_for(ext: Option<&str>) -> String {
    match ext {
        Some("md") => "md".to_string(),
        Some(other) => other.to_string(),
        None => "file".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("z.md"), "z").unwrap();
        fs::write(root.join("m.md"), "m").unwrap();
        fs::write(root.join("a/one.md"), "1").unwrap();
        fs::write(root.join("b/two.md"), "2").unwrap();
        fs::write(root.join("b/inner/three.md"), "3").unwrap();
        dir
    }

    fn listing(walker: &TreeWalker) -> Vec<(String, Vec<String>)> {
        walker
            .walk()
            .map(|l| {
                let l = l.unwrap();
                (l.rel_path, l.files.into_iter().map(|f| f.rel_path).collect())
            })
            .collect()
    }

    #[test]
    fn walks_root_first_in_sorted_order() {
        let dir = tree();
        let walker = TreeWalker::new(dir.path(), true, false);
        assert_eq!(
            listing(&walker),
            vec![
                ("".to_string(), vec!["m.md".to_string(), "z.md".to_string()]),
                ("a".to_string(), vec!["a/one.md".to_string()]),
                ("b".to_string(), vec!["b/two.md".to_string()]),
                ("b/inner".to_string(), vec!["b/inner/three.md".to_string()]),
            ]
        );
    }

    #[test]
    fn walk_is_restartable() {
        let dir = tree();
        let walker = TreeWalker::new(dir.path(), true, false);
        assert_eq!(listing(&walker), listing(&walker));
    }

    #[test]
    fn depth_follows_nesting() {
        let dir = tree();
        let walker = TreeWalker::new(dir.path(), true, false);
        let depths: Vec<i64> = walker.walk().map(|l| l.unwrap().depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 2]);
    }

    #[test]
    fn non_recursive_lists_root_only() {
        let dir = tree();
        let walker = TreeWalker::new(dir.path(), false, false);
        let dirs: Vec<String> = listing(&walker).into_iter().map(|(d, _)| d).collect();
        assert_eq!(dirs, vec!["".to_string()]);
    }

    #[test]
    fn missing_root_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let walker = TreeWalker::new(dir.path().join("absent"), true, false);
        assert!(!walker.root_exists());
        assert_eq!(walker.walk().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_follow_the_flag() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("link")).unwrap();
        // A loop back to the root must not be walked forever.
        std::os::unix::fs::symlink(dir.path(), dir.path().join("b/up")).unwrap();

        let plain: Vec<String> = listing(&TreeWalker::new(dir.path(), true, false))
            .into_iter()
            .map(|(d, _)| d)
            .collect();
        assert!(!plain.contains(&"link".to_string()));

        let followed: Vec<String> = listing(&TreeWalker::new(dir.path(), true, true))
            .into_iter()
            .map(|(d, _)| d)
            .collect();
        assert!(!followed.iter().any(|d| d.ends_with("up")));
        // "a" and "link" resolve to the same directory; only the first is walked.
        assert!(followed.contains(&"a".to_string()));
        assert!(!followed.contains(&"link".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_listed_but_fails_stat() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.md"), dir.path().join("dangling.md"))
            .unwrap();
        let walker = TreeWalker::new(dir.path(), true, false);
        let root = walker.walk().next().unwrap().unwrap();
        assert_eq!(root.files.len(), 1);
        assert!(stat_file(&root.files[0].abs_path).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_set_aside() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.md"), "ok").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.md")), "a").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xfe.md")), "b").unwrap();

        let root = TreeWalker::new(dir.path(), true, false)
            .walk()
            .next()
            .unwrap()
            .unwrap();
        let files: Vec<&str> = root.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(files, vec!["ok.md"]);
        assert_eq!(root.unreadable_names.len(), 2);
    }

    #[test]
    fn stat_hash_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("n.md");
        fs::write(&path, b"caf\xc3\xa9 \xff").unwrap();
        let observed = stat_file(&path).unwrap();
        assert_eq!(observed.size_bytes, 7);
        assert!(observed.mtime_epoch > 0);
        assert_eq!(hash_file(&path).unwrap().len(), 64);
        assert_eq!(read_text(&path).unwrap(), "café \u{fffd}");
    }

    #[test]
    fn title_and_type_from_path() {
        assert_eq!(extension_of("notes/Plan.MD").as_deref(), Some("md"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(title_of("notes/session.12.md"), "session.12");
        assert_eq!(doc_type_for(Some("md")), "md");
        assert_eq!(doc_type_for(Some("txt")), "txt");
        assert_eq!(doc_type_for(None), "file");
    }
}
