use std::ffi::{OsStr, OsString};

use clap::ColorChoice;

use crate::logger::LogLevel;

#[derive(clap::Parser)]
#[command(name = "luashim", version, author, about, long_about = None)]
pub struct Args {
    /// Color preferences for diagnostics
    #[clap(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    /// Verbosity of the host's own log written on stderr
    #[clap(long, value_name = "LEVEL", env = "LUASHIM_LOG", default_value = "off")]
    pub log: LogLevel,

    /// Path to the script followed by the arguments given to it
    #[clap(
        value_name = "ARGS",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<OsString>,
}

impl Args {
    /// Returns the script path given on the command line
    pub fn script_path(&self) -> &OsStr {
        self.args.first().map_or_else(Default::default, OsString::as_os_str)
    }

    /// Returns the arguments that follow the script path, in their original order
    pub fn script_args(&self) -> &[OsString] {
        self.args.get(1..).unwrap_or_default()
    }

    /// Applies `--color` to the diagnostics written on stderr
    pub fn apply_color(&self) {
        match self.color {
            ColorChoice::Always => console::set_colors_enabled_stderr(true),
            ColorChoice::Never => console::set_colors_enabled_stderr(false),
            ColorChoice::Auto => {}
        }
    }
}
