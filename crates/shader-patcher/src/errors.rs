use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Game data directory not found: {path}")]
    #[diagnostic(
        code(game::data_dir_not_found),
        help("Pass the game folder (containing Data/) or the Data folder itself, and check --game-type")
    )]
    DataDirNotFound { path: Utf8PathBuf },

    #[error("Output directory {output} is inside the data directory {data}")]
    #[diagnostic(
        code(output::inside_data),
        help("Choose an output directory outside the game's Data folder")
    )]
    OutputInsideData {
        output: Utf8PathBuf,
        data: Utf8PathBuf,
    },

    #[error("Output directory {dir} contains '{entry}', which was not created by this tool")]
    #[diagnostic(
        code(output::unsafe_cleanup),
        help("Empty the output directory, pick another one, or run with --no-cleanup")
    )]
    UnsafeOutputDir { dir: Utf8PathBuf, entry: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(config::invalid),
        help("Check the JSON files under shaderpatcher/ and your user configuration for typos")
    )]
    InvalidConfig { message: String },

    #[error("Patching failed")]
    #[diagnostic(code(patch::failed), help("Run with -v for more detail in the log"))]
    Patch {
        #[source]
        source: sp_patcher::Error,
    },

    #[error("Unable to read game data")]
    #[diagnostic(code(game::read_failed))]
    Vfs {
        #[source]
        source: sp_vfs::Error,
    },
}

impl From<sp_patcher::Error> for CliError {
    fn from(error: sp_patcher::Error) -> Self {
        match error {
            sp_patcher::Error::OutputInsideData { output, data } => {
                Self::OutputInsideData { output, data }
            }
            sp_patcher::Error::UnsafeOutputDir { dir, entry } => Self::UnsafeOutputDir { dir, entry },
            sp_patcher::Error::ValidationFailure(message) => Self::InvalidConfig { message },
            source => Self::Patch { source },
        }
    }
}

impl From<sp_vfs::Error> for CliError {
    fn from(error: sp_vfs::Error) -> Self {
        match error {
            sp_vfs::Error::InvalidDataDir(path) => Self::DataDirNotFound { path },
            source => Self::Vfs { source },
        }
    }
}
