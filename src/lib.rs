#[macro_export]
macro_rules! debug_log {
	($($arg:tt)*) => {{
		#[cfg(debug_assertions)]
		{
			eprintln!($($arg)*);
		}
	}};
}

pub mod config;
pub mod scanner;
pub mod languages;
pub mod syntax;
pub mod kind;
pub mod outline;
pub mod fuzzy;
pub mod file_cache;
pub mod index;
pub mod resolve;
pub mod workspace_symbols;
pub mod workspace;
pub mod server;
