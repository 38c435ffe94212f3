//! Runs `main.lua` from the working directory, exposing the command-line arguments
//! as the `c_args` sequence and calling its global `main` function.

use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;

use tracing::debug;

mod cli;
mod launcher;
mod logger;

use crate::cli::Args;
use crate::launcher::{Launcher, SCRIPT_FILE};

fn main() {
    let result = run();

    proc_exit::exit(result);
}

fn usage() -> proc_exit::Exit {
    let program = std::env::args_os()
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| clap::crate_name!().into());

    proc_exit::Code::FAILURE.with_message(format!(
        "Usage: {} <path_to_lua_script> [args...]",
        program.display()
    ))
}

/// Renders a clap error, with ANSI styling only when stderr accepts colors
fn render_parse_error(error: &clap::Error) -> String {
    let rendered = error.render();
    let rendered = if console::colors_enabled_stderr() {
        rendered.ansi().to_string()
    } else {
        rendered.to_string()
    };

    rendered.trim_end().to_owned()
}

fn run() -> proc_exit::ExitResult {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            ErrorKind::MissingRequiredArgument => return Err(usage()),
            _ => return Err(proc_exit::Code::FAILURE.with_message(render_parse_error(&e))),
        },
    };

    args.apply_color();
    logger::init(args.log);

    // Only delimits the script arguments: the script itself is always `main.lua`.
    debug!(
        script_path = %args.script_path().to_string_lossy(),
        "ignoring script path in favor of `{SCRIPT_FILE}`"
    );

    // The launcher, and the Lua state it owns, must be dropped before `proc_exit::exit` runs.
    let launcher = Launcher::new(SCRIPT_FILE)?;
    debug!(script = %launcher.script().display(), "launching");
    launcher.launch(args.script_args())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::render_parse_error;
    use crate::cli::Args;

    #[test]
    fn parse_error_without_colors() {
        console::set_colors_enabled_stderr(false);
        let error = Args::try_parse_from(["luashim", "--log", "loud", "main.lua"])
            .err()
            .unwrap();
        let rendered = render_parse_error(&error);
        assert!(rendered.contains("invalid value 'loud'"));
        assert!(!rendered.contains('\x1b'));
        assert!(!rendered.ends_with('\n'));
    }
}
