//! Command-line argument parsing for the cellatlas demo.

use cellatlas::{AntialiasMode, CursorType, Settings};

/// Command-line interface configuration.
#[derive(Debug, Default, PartialEq)]
pub struct Cli {
    /// Font family name
    pub font: Option<String>,

    /// Font size in DIPs
    pub size: Option<f32>,

    pub cursor: Option<CursorType>,

    pub antialiasing: Option<AntialiasMode>,

    /// Print usage and exit
    pub help: bool,
}

pub const USAGE: &str = "\
cellatlas - glyph atlas renderer demo

Usage: cellatlas [OPTIONS]

Options:
  -h, --help             Show this help message
  -f, --font NAME        Font family (default: system monospace)
  -s, --size PX          Font size in DIPs (default: 12)
  -c, --cursor TYPE      legacy, bar, underscore, double-underscore,
                         empty-box or block
  -a, --antialias MODE   grayscale, cleartype or aliased";

impl Cli {
    /// Parse the process arguments.
    pub fn parse() -> Result<Self, Box<dyn std::error::Error>> {
        Self::parse_from(std::env::args().skip(1))
    }

    pub fn parse_from<I>(args: I) -> Result<Self, Box<dyn std::error::Error>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut cli = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-f" | "--font" => {
                    let Some(name) = args.next() else {
                        return Err("--font requires a value".into());
                    };
                    cli.font = Some(name);
                }
                "-s" | "--size" => {
                    let Some(size) = args.next() else {
                        return Err("--size requires a value".into());
                    };
                    let size: f32 = size
                        .parse()
                        .map_err(|_| format!("invalid font size: {size}"))?;
                    if !(size > 0.0) {
                        return Err(format!("font size must be positive: {size}").into());
                    }
                    cli.size = Some(size);
                }
                "-c" | "--cursor" => {
                    let Some(cursor) = args.next() else {
                        return Err("--cursor requires a value".into());
                    };
                    cli.cursor = Some(cursor.parse()?);
                }
                "-a" | "--antialias" => {
                    let Some(mode) = args.next() else {
                        return Err("--antialias requires a value".into());
                    };
                    cli.antialiasing = Some(mode.parse()?);
                }
                "-h" | "--help" => cli.help = true,
                arg => {
                    return Err(format!("Unknown argument: {arg}. Use --help for usage.").into());
                }
            }
        }

        Ok(cli)
    }

    /// Apply CLI overrides to the settings record.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(size) = self.size {
            settings.font_size = size;
        }
        if let Some(cursor) = self.cursor {
            settings.cursor.cursor_type = cursor;
        }
        if let Some(mode) = self.antialiasing {
            settings.antialiasing = mode;
        }
    }
}
