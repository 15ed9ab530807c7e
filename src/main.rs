use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use symdex::config::{load_config, SymbolSearchMode};
use symdex::scanner::path_to_uri;
use symdex::server::run_stdio_server;
use symdex::syntax::Position;
use symdex::workspace::Workspace;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "symdex")]
#[command(version)]
#[command(about = "Cross-language symbol index: outlines, references, completion and workspace symbol search")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the JSON-RPC stdio server
    Serve,

    /// Print the symbol outline of one file as JSON
    Outline {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Fuzzy-search symbol names across a workspace
    Symbols {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Workspace root (defaults to the current directory)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// off | documents | workspace (defaults to `search.mode` from the config file)
        #[arg(long)]
        mode: Option<SymbolSearchMode>,
    },

    /// List references to the identifier at LINE:COL (0-based)
    References {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        line: u32,
        col: u32,

        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Also report definitions
        #[arg(long)]
        include_declaration: bool,
    },

    /// Completion candidates at LINE:COL (0-based)
    Complete {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        line: u32,
        col: u32,

        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve => run_stdio_server(),
        Command::Outline { file } => {
            let abs = absolute(&file)?;
            let root = abs.parent().unwrap_or(Path::new("."));
            let ws = Workspace::new(load_config(root));
            let Some(symbols) = ws.build_outline(&path_to_uri(&abs)) else {
                return Err(anyhow!("Unsupported or unreadable file: {}", file.display()));
            };
            print_json(&symbols)
        }
        Command::Symbols { query, root, mode } => {
            let ws = open_workspace(root)?;
            let rt = tokio::runtime::Runtime::new()?;
            let found = rt.block_on(ws.search_workspace_symbols(&query, mode, &CancellationToken::new()));
            print_json(&found)
        }
        Command::References {
            file,
            line,
            col,
            root,
            include_declaration,
        } => {
            let ws = open_workspace(root)?;
            let uri = path_to_uri(&absolute(&file)?);
            let refs = ws.find_references(&uri, Position::new(line, col), include_declaration);
            print_json(&refs)
        }
        Command::Complete { file, line, col, root } => {
            let ws = open_workspace(root)?;
            let uri = path_to_uri(&absolute(&file)?);
            let mut items: Vec<_> = ws.complete(&uri, Position::new(line, col)).into_values().collect();
            items.sort_by(|a, b| a.label.cmp(&b.label));
            print_json(&json!({ "items": items }))
        }
    }
}

fn open_workspace(root: Option<PathBuf>) -> Result<Workspace> {
    let root = match root {
        Some(r) => absolute(&r)?,
        None => std::env::current_dir().context("Failed to get current dir")?,
    };
    Workspace::open(&root).with_context(|| format!("Failed to index {}", root.display()))
}

fn absolute(p: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(p).with_context(|| format!("No such file or directory: {}", p.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
