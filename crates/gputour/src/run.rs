use anyhow::{Context, Result};
use demos::{DemoConfig, DemoKind};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::config::DefaultsFile;

pub fn run(args: Cli) -> Result<()> {
    initialise_tracing();

    if let Some(Command::List) = args.command {
        print_demo_list();
        return Ok(());
    }

    let Some(demo) = args.demo else {
        anyhow::bail!("no demo selected; run `gputour list` to see what is available");
    };

    let defaults = match args.config.as_deref() {
        Some(path) => {
            let defaults = DefaultsFile::load(path)
                .with_context(|| format!("failed to load defaults from {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded defaults file");
            defaults
        }
        None => DefaultsFile::default(),
    };
    let resolved = defaults.resolve(demo);

    let mut config = DemoConfig::default();
    if let Some(size) = args.size.or(resolved.size) {
        config.surface_size = size;
    }
    config.image = args.image.or(resolved.image);
    config.animation = args.animation.or(resolved.animation);

    tracing::info!(
        demo = demo.name(),
        width = config.surface_size.0,
        height = config.surface_size.1,
        "launching demo"
    );
    demos::run(demo, &config)
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_demo_list() {
    println!("available demos:");
    for kind in DemoKind::ALL {
        println!("  {:<14} {}", kind.name(), kind.summary());
    }
}
