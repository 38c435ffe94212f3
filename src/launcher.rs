use std::borrow::Cow;
use std::ffi::OsString;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use console::style;

use mlua::{Lua, LuaOptions, StdLib, Value};

use tracing::{debug, trace};

/// Script loaded from the working directory, whatever path is given on the command line
pub const SCRIPT_FILE: &str = "main.lua";

/// Global through which the script reads its arguments
pub const ARGS_GLOBAL: &str = "c_args";

/// Global function called once the script is loaded
pub const ENTRY_POINT: &str = "main";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reasons a launch can fail, each displayed as the diagnostic line printed on stderr
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Cannot create state: not enough memory")]
    CreateState,

    #[error("Error loading script: cannot open {}: {}", .path.display(), os_message(.source))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error loading script: {}", lua_message(.0))]
    Load(#[source] mlua::Error),

    #[error("Error running script: {}", lua_message(.0))]
    Run(#[source] mlua::Error),

    #[error("Error running script: attempt to call a {type_name} value (global 'main')")]
    NotCallable { type_name: &'static str },
}

impl From<LaunchError> for proc_exit::Exit {
    fn from(error: LaunchError) -> Self {
        let message = style(error).for_stderr().red().to_string();

        Self::new(proc_exit::Code::FAILURE).with_message(message)
    }
}

/// Returns the message the Lua runtime produced, without mlua's decorations
fn lua_message(error: &mlua::Error) -> Cow<'_, str> {
    match error {
        mlua::Error::RuntimeError(message) | mlua::Error::MemoryError(message) => {
            // mlua's message handler appends a traceback to string errors.
            let message = message
                .split_once("\nstack traceback:")
                .map_or(message.as_str(), |(message, _)| message);
            Cow::Borrowed(message)
        }
        mlua::Error::SyntaxError { message, .. } => Cow::Borrowed(message.as_str()),
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            lua_message(cause)
        }
        error => Cow::Owned(error.to_string()),
    }
}

/// Formats an I/O error the way `strerror` does, without the `(os error N)` suffix
fn os_message(error: &std::io::Error) -> String {
    let message = error.to_string();
    match message.split_once(" (os error ") {
        Some((message, _)) => message.to_owned(),
        None => message,
    }
}

/// Skips a UTF-8 BOM and a first line starting with `#` (e.g., a shebang).
///
/// The newline ending the skipped line is kept so line numbers in messages stay right.
fn skip_comment(source: &[u8]) -> &[u8] {
    let source = source.strip_prefix(UTF8_BOM).unwrap_or(source);
    if !source.starts_with(b"#") {
        return source;
    }

    source
        .iter()
        .position(|&byte| byte == b'\n')
        .and_then(|newline| source.get(newline..))
        .unwrap_or_default()
}

/// Runs `create`, turning a panic (which is how mlua reports a failed allocation of the state)
/// into [`LaunchError::CreateState`]
fn create_state(create: impl FnOnce() -> Lua) -> Result<Lua, LaunchError> {
    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let lua = std::panic::catch_unwind(AssertUnwindSafe(create));
    std::panic::set_hook(hook);

    lua.map_err(|_| LaunchError::CreateState)
}

/// Owns the Lua state for the duration of a single launch.
///
/// The state is dropped, and every resource it holds released, when the launcher goes out of scope,
/// which happens on every path out of [`Launcher::launch`].
pub struct Launcher {
    lua: Lua,
    script: PathBuf,
}

impl Launcher {
    /// Creates a Lua state with the whole standard library opened, ready to load `script`
    pub fn new(script: impl Into<PathBuf>) -> Result<Self, LaunchError> {
        // SAFETY: scripts are trusted like any program run by the user, so they get the same
        // libraries as the stock interpreter, `debug` and C modules included.
        let lua = create_state(|| unsafe {
            Lua::unsafe_new_with(StdLib::ALL, LuaOptions::default())
        })?;
        debug!("created Lua state");

        Ok(Self::with_state(lua, script))
    }

    /// Wraps an already created Lua state
    pub fn with_state(lua: Lua, script: impl Into<PathBuf>) -> Self {
        Self {
            lua,
            script: script.into(),
        }
    }

    /// Path of the script this launcher loads
    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Loads the script and calls its entry point with `args` published beforehand.
    ///
    /// Consumes the launcher so the Lua state is closed before the caller gets the result.
    pub fn launch<I>(self, args: I) -> Result<(), LaunchError>
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        self.load()?;
        self.publish_args(args)?;
        self.call_entry_point()
    }

    /// Reads and executes the script, which is expected to define the entry point
    pub fn load(&self) -> Result<(), LaunchError> {
        let source = std::fs::read(&self.script).map_err(|source| LaunchError::Open {
            path: self.script.clone(),
            source,
        })?;

        self.lua
            .load(skip_comment(&source))
            .set_name(format!("@{}", self.script.display()))
            .exec()
            .map_err(LaunchError::Load)?;
        debug!(script = %self.script.display(), "loaded script");

        Ok(())
    }

    /// Publishes `args` as a sequence (starting at 1) under [`ARGS_GLOBAL`].
    ///
    /// Arguments are passed as raw bytes, so they do not need to be valid UTF-8.
    pub fn publish_args<I>(&self, args: I) -> Result<(), LaunchError>
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        let args = args
            .into_iter()
            .map(Into::into)
            .enumerate()
            .map(|(i, arg)| {
                trace!(index = i + 1, arg = %arg.to_string_lossy(), "publishing argument");
                self.lua.create_string(arg.as_encoded_bytes())
            })
            .collect::<mlua::Result<Vec<_>>>()
            .map_err(LaunchError::Run)?;
        let len = args.len();

        let sequence = self
            .lua
            .create_sequence_from(args)
            .map_err(LaunchError::Run)?;
        self.lua
            .globals()
            .set(ARGS_GLOBAL, sequence)
            .map_err(LaunchError::Run)?;
        debug!(len, "published `{ARGS_GLOBAL}`");

        Ok(())
    }

    /// Calls [`ENTRY_POINT`] without arguments, ignoring whatever it returns
    pub fn call_entry_point(&self) -> Result<(), LaunchError> {
        let entry_point = self
            .lua
            .globals()
            .get::<Value>(ENTRY_POINT)
            .map_err(LaunchError::Run)?;

        let Value::Function(entry_point) = entry_point else {
            return Err(LaunchError::NotCallable {
                type_name: entry_point.type_name(),
            });
        };

        debug!("calling `{ENTRY_POINT}`");
        entry_point.call::<()>(()).map_err(LaunchError::Run)
    }
}
