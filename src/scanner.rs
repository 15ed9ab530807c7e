use anyhow::{Context, Result};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::languages::registry;

fn default_overrides(repo_root: &Path, exclude_dir_names: &[String]) -> Result<Override> {
    let mut ob = OverrideBuilder::new(repo_root);

    // Note: For directories, include patterns for both the directory entry and its descendants,
    // otherwise walkers may still descend into the directory.

    // Minified bundles and generated declaration noise
    ob.add("!**/*.min.js")?;
    ob.add("!**/*.bundle.js")?;

    // Common build outputs / heavy dirs
    for d in [
        ".git",
        "node_modules",
        "target",
        "dist",
        "build",
        "coverage",
        ".next",
        ".nuxt",
        ".venv",
        "__pycache__",
        ".vscode-test",
        "out",
    ] {
        ob.add(&format!("!**/{d}"))?;
        ob.add(&format!("!**/{d}/**"))?;
    }

    // Project-specific excluded dirs
    for d in exclude_dir_names {
        let d = d.trim().trim_matches('/');
        if d.is_empty() {
            continue;
        }
        ob.add(&format!("!**/{d}"))?;
        ob.add(&format!("!**/{d}/**"))?;
    }

    Ok(ob.build()?)
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub abs_path: PathBuf,
    pub rel_path: PathBuf,
    pub language_id: &'static str,
}

impl FileEntry {
    pub fn uri(&self) -> String {
        path_to_uri(&self.abs_path)
    }
}

/// Enumerate indexable source files under `root`.
///
/// Only files with a registered language are returned. The walk stops silently
/// once `scan.max_files` entries are collected, so callers must not assume the
/// result covers the whole tree.
pub fn scan_workspace(root: &Path, cfg: &Config) -> Result<Vec<FileEntry>> {
    let meta = std::fs::metadata(root)
        .with_context(|| format!("Workspace root does not exist: {}", root.display()))?;
    let max_file_bytes = cfg.effective_max_file_bytes();

    if meta.is_file() {
        return Ok(scan_single_file(root, max_file_bytes).into_iter().collect());
    }

    let overrides = default_overrides(root, &cfg.scan.exclude_dir_names)?;
    let walker = WalkBuilder::new(root)
        .standard_filters(true) // .gitignore, .ignore, hidden, etc.
        .overrides(overrides)
        .build();

    let reg = registry();
    let mut entries = Vec::new();

    for item in walker {
        let dent = match item {
            Ok(d) => d,
            Err(_) => continue,
        };

        if !dent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let abs_path = dent.into_path();
        let Some(language_id) = reg.language_id_for_path(&abs_path) else {
            continue;
        };

        let bytes = match std::fs::metadata(&abs_path).map(|m| m.len()) {
            Ok(b) => b,
            Err(_) => continue,
        };

        if bytes == 0 || bytes > max_file_bytes {
            continue;
        }

        let rel_path = path_relative_to(&abs_path, root)
            .with_context(|| format!("Failed to relativize path: {}", abs_path.display()))?;

        entries.push(FileEntry {
            abs_path,
            rel_path,
            language_id,
        });

        if entries.len() >= cfg.scan.max_files {
            crate::debug_log!(
                "[symdex] file cap ({}) reached under {}; remaining files not indexed",
                cfg.scan.max_files,
                root.display()
            );
            break;
        }
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

fn scan_single_file(abs_path: &Path, max_file_bytes: u64) -> Option<FileEntry> {
    let language_id = registry().language_id_for_path(abs_path)?;
    let bytes = std::fs::metadata(abs_path).ok()?.len();
    if bytes == 0 || bytes > max_file_bytes {
        return None;
    }
    Some(FileEntry {
        abs_path: abs_path.to_path_buf(),
        rel_path: PathBuf::from(abs_path.file_name()?),
        language_id,
    })
}

fn path_relative_to(path: &Path, base: &Path) -> Result<PathBuf> {
    let rel = path
        .strip_prefix(base)
        .with_context(|| format!("{} is not under {}", path.display(), base.display()))?;
    Ok(rel.to_path_buf())
}

/// `file://` URI for an absolute path (forward slashes, no percent-encoding).
pub fn path_to_uri(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

/// Inverse of [`path_to_uri`]; `None` for non-`file` URIs.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    // `file:///C:/x` → `C:/x`
    let bytes = rest.as_bytes();
    if bytes.len() > 3 && bytes[0] == b'/' && bytes[2] == b':' {
        return Some(PathBuf::from(&rest[1..]));
    }
    Some(PathBuf::from(rest))
}
