// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "switch2-driver")]
#[command(author, version, about = "Nintendo Switch 2 wired controller driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/switch2-driver/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bind every connected controller and expose it as a gamepad (default)
    Run,

    /// List connected controllers
    #[command(visible_aliases = ["ls", "l"])]
    List,

    /// Initialize one controller and print its identity and calibration
    #[command(visible_alias = "i")]
    Info {
        /// Device name (e.g. 1-2) or sysfs path; first controller if omitted
        #[arg(short, long)]
        device: Option<String>,

        /// Give up if initialization takes longer than this
        #[arg(long, default_value = "3000")]
        timeout_ms: u64,
    },

    /// Rumble one controller
    #[command(visible_alias = "r")]
    Rumble {
        /// Device name (e.g. 1-2) or sysfs path; first controller if omitted
        #[arg(short, long)]
        device: Option<String>,

        /// Low-frequency (strong) motor intensity
        #[arg(short, long, default_value = "32768")]
        strong: u16,

        /// High-frequency (weak) motor intensity
        #[arg(short, long, default_value = "32768")]
        weak: u16,

        /// How long to rumble
        #[arg(long, default_value = "500")]
        duration_ms: u64,
    },

    /// Show or save the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the effective configuration to the config path
    Save,
}
