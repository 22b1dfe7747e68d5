use camino::Utf8PathBuf;
use std::env;

#[macro_export]
macro_rules! println_pad {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        for __line in __s.lines() {
            println!("    {}", __line);
        }
    }};
}

/// Install the global subscriber. `RUST_LOG` wins over the `-v` count.
pub fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

/// Returns the directory where the current executable resides.
pub fn install_dir() -> Option<Utf8PathBuf> {
    let exe = env::current_exe().ok()?;
    let parent = exe.parent()?;
    Utf8PathBuf::from_path_buf(parent.to_path_buf()).ok()
}

/// Default output directory, next to the executable.
pub fn default_output_dir() -> Utf8PathBuf {
    install_dir()
        .unwrap_or_default()
        .join("ShaderPatcher_Output")
}

/// Default user configuration, `cfg/user.json` next to the executable.
pub fn default_user_config() -> Option<Utf8PathBuf> {
    install_dir().map(|dir| dir.join("cfg").join(sp_patcher::USER_CONFIG_FILE))
}
