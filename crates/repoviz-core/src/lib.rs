pub mod analysis;
pub mod config;
pub mod repo;

pub use analysis::*;
pub use config::AnalyzerConfig;
pub use repo::{parse_repo_url, RepoUrlParser, RepositoryRef};
