use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = ".symdex.json";

/// Controls workspace enumeration (what to index).
///
/// Note: `.gitignore` is always respected by the scanner; these are additional
/// hard skips for noisy monorepo directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory *names* to skip anywhere in the tree (e.g. "generated", "tmp").
    ///
    /// These are compared against path components, not full paths.
    pub exclude_dir_names: Vec<String>,
    /// Files larger than this are never indexed.
    pub max_file_bytes: u64,
    /// Enumeration stops silently after this many files.
    pub max_files: usize,
}

/// Hard safety ceiling: files larger than this are **always** skipped, regardless of config.
/// Minified bundles and generated blobs above this are never parsed.
pub const ABSOLUTE_MAX_FILE_BYTES: u64 = 1_000_000; // 1 MB

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_dir_names: vec![],
            // 512 KB
            max_file_bytes: 512 * 1024,
            max_files: 20_000,
        }
    }
}

/// Which sources `workspace/symbol` consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolSearchMode {
    /// Never answer.
    Off,
    /// Open documents only.
    Documents,
    /// Open documents plus every indexed file (prefiltered, batched).
    Workspace,
}

impl std::fmt::Display for SymbolSearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolSearchMode::Off => write!(f, "off"),
            SymbolSearchMode::Documents => write!(f, "documents"),
            SymbolSearchMode::Workspace => write!(f, "workspace"),
        }
    }
}

impl std::str::FromStr for SymbolSearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(SymbolSearchMode::Off),
            "documents" => Ok(SymbolSearchMode::Documents),
            "workspace" => Ok(SymbolSearchMode::Workspace),
            other => Err(anyhow::anyhow!("unknown symbol search mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default mode for workspace symbol requests that don't name one.
    pub mode: SymbolSearchMode,
    /// Unopened files loaded concurrently per batch; cancellation is checked between batches.
    pub batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SymbolSearchMode::Workspace,
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings that govern file discovery and exclusion.
    pub scan: ScanConfig,
    pub search: SearchConfig,
}

impl Config {
    pub fn effective_max_file_bytes(&self) -> u64 {
        self.scan.max_file_bytes.min(ABSOLUTE_MAX_FILE_BYTES)
    }
}

pub fn load_config(repo_root: &Path) -> Config {
    let primary = repo_root.join(CONFIG_FILE_NAME);

    let text = std::fs::read_to_string(&primary);
    let Ok(text) = text else { return Config::default() };

    serde_json::from_str::<Config>(&text).unwrap_or_else(|_e| {
        crate::debug_log!("[symdex] ignoring malformed {}: {}", primary.display(), _e);
        Config::default()
    })
}
