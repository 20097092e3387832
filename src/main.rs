use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dual_render::{
    flow::{self, RunOptions},
    renderer::Backend,
    resources,
};

#[derive(Parser, Debug)]
#[command(
    name = "dual-render",
    version,
    about = "Renders a small lit scene with either a Vulkan or an immediate-mode backend"
)]
struct Cli {
    /// Backend to render with.
    #[arg(value_enum, default_value_t = BackendArg::Immediate)]
    backend: BackendArg,

    /// Enable the Vulkan validation layer and forward its messages to the log.
    #[arg(long, env = "DUAL_RENDER_DEBUG")]
    debug: bool,

    /// Exit after presenting this many frames.
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Directory holding `models/` and `shaders/`.
    #[arg(long, value_name = "DIR", env = "DUAL_RENDER_ASSETS")]
    assets: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    Vulkan,
    #[value(alias = "opengl")]
    Immediate,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Vulkan => Backend::Vulkan,
            BackendArg::Immediate => Backend::Immediate,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    flow::init_logging();

    if let Some(dir) = cli.assets {
        log::debug!("Asset directory {}", dir.display());
        resources::set_asset_root(dir);
    }

    let mut options = RunOptions::new(cli.backend.into());
    options.config.debug = cli.debug;
    options.config.window_title = format!("dual-render ({})", options.backend);
    options.frame_limit = cli.frames;

    let summary = flow::run(options, flow::demo_scene)?;
    log::info!(
        "{} backend presented {} frame(s)",
        summary.backend,
        summary.frames_presented
    );
    Ok(())
}
