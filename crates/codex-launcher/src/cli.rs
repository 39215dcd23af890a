use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "codex-launcher")]
#[command(about = "Starts the bundled Codex backend and keeps it alive")]
#[command(version)]
pub struct Cli {
    /// Directory containing the backend executable (defaults to this binary's directory)
    #[arg(long)]
    pub(crate) install_dir: Option<PathBuf>,

    /// Directory holding config.toml (defaults to the install directory)
    #[arg(long)]
    pub(crate) config_dir: Option<PathBuf>,

    /// Extra CORS origin for the backend; may be repeated
    #[arg(long = "allow-origin")]
    pub(crate) allowed_origins: Vec<String>,
}

impl Cli {
    pub(crate) fn resolve_install_dir(&self) -> PathBuf {
        self.install_dir.clone().unwrap_or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }
}
