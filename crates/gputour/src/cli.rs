use std::path::PathBuf;

use clap::{Parser, Subcommand};
use demos::DemoKind;

#[derive(Parser, Debug)]
#[command(
    name = "gputour",
    author,
    version,
    about = "Guided tour of single-screen wgpu demos",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Demo to launch; `gputour list` shows every name.
    #[arg(value_name = "DEMO", value_parser = parse_demo)]
    pub demo: Option<DemoKind>,

    /// Override the window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Image sampled by the textured demos.
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Animated GIF played by the animated quad.
    #[arg(long, value_name = "PATH")]
    pub animation: Option<PathBuf>,

    /// Defaults file; can also be supplied via the `GPUTOUR_CONFIG` env var.
    #[arg(long, value_name = "PATH", env = "GPUTOUR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every demo with a one-line description.
    List,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_demo(value: &str) -> Result<DemoKind, String> {
    DemoKind::from_name(value).ok_or_else(|| {
        let names = DemoKind::ALL
            .iter()
            .map(|kind| kind.name())
            .collect::<Vec<_>>()
            .join(", ");
        format!("unknown demo '{value}'; expected one of: {names}")
    })
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim().to_ascii_lowercase();
    let (width, height) = trimmed
        .split_once('x')
        .ok_or_else(|| format!("invalid size '{value}'; expected WIDTHxHEIGHT, e.g. 1280x720"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size '{value}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size '{value}'"))?;

    if width == 0 || height == 0 {
        return Err(format!("size '{value}' must be non-zero in both dimensions"));
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_size_variants() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 800X600 ").unwrap(), (800, 600));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("1280xseven").is_err());
    }

    #[test]
    fn parses_demo_names() {
        assert_eq!(parse_demo("cube").unwrap(), DemoKind::Cube);
        assert_eq!(parse_demo("Textured-Quad").unwrap(), DemoKind::TexturedQuad);
        assert!(parse_demo("teapot").is_err());
    }

    #[test]
    fn list_wins_over_the_positional() {
        let cli = Cli::try_parse_from(["gputour", "list"]).unwrap();
        assert!(cli.demo.is_none());
        assert!(matches!(cli.command, Some(Command::List)));
    }

    #[test]
    fn demo_and_flags_parse_together() {
        let cli = Cli::try_parse_from(["gputour", "cube", "--size", "800x600"]).unwrap();
        assert_eq!(cli.demo, Some(DemoKind::Cube));
        assert_eq!(cli.size, Some((800, 600)));
    }
}
