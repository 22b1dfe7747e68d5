mod load_order;
mod patch;

pub use load_order::*;
pub use patch::*;

use crate::errors::CliError;
use camino::Utf8PathBuf;
use clap::ValueEnum;
use miette::Result;
use sp_vfs::{DataDirectory, GameInstall, GameType};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameKind {
    SkyrimSe,
    SkyrimGog,
    SkyrimVr,
    Skyrim,
    Enderal,
    EnderalSe,
}

impl From<GameKind> for GameType {
    fn from(kind: GameKind) -> Self {
        match kind {
            GameKind::SkyrimSe => GameType::SkyrimSE,
            GameKind::SkyrimGog => GameType::SkyrimGog,
            GameKind::SkyrimVr => GameType::SkyrimVR,
            GameKind::Skyrim => GameType::Skyrim,
            GameKind::Enderal => GameType::Enderal,
            GameKind::EnderalSe => GameType::EnderalSE,
        }
    }
}

/// Arguments shared by every command that reads the game's data.
#[derive(clap::Args, Debug)]
pub struct GameArgs {
    /// Game folder, or its Data folder
    #[arg(short, long)]
    pub game_dir: String,

    /// Which game is installed
    #[arg(long, value_enum, default_value = "skyrim-se")]
    pub game_type: GameKind,

    /// Folder containing "My Games" (where the game's INI files live)
    #[arg(long)]
    pub documents_dir: Option<String>,

    /// Local app-data folder (where plugins.txt lives)
    #[arg(long)]
    pub appdata_dir: Option<String>,
}

impl GameArgs {
    pub fn locate(&self) -> Result<GameInstall> {
        let mut game = GameInstall::locate(
            self.game_type.into(),
            &Utf8PathBuf::from(&self.game_dir),
        )
        .map_err(CliError::from)?;
        if let Some(dir) = &self.documents_dir {
            game = game.with_documents_dir(Utf8PathBuf::from(dir));
        }
        if let Some(dir) = &self.appdata_dir {
            game = game.with_appdata_dir(Utf8PathBuf::from(dir));
        }
        Ok(game)
    }
}

/// Archive load order for a located game.
pub fn archive_order(game: &GameInstall, directory: &DataDirectory) -> Result<Vec<String>> {
    let ini_archives = sp_vfs::read_ini_archives(&game.ini_paths()).map_err(CliError::from)?;
    let plugins = match game.plugins_txt() {
        Some(path) if path.is_file() => {
            sp_vfs::read_active_plugins(&path).map_err(CliError::from)?
        }
        _ => {
            tracing::warn!("plugins.txt not found, only INI archives are loaded");
            Vec::new()
        }
    };
    let data_archives = directory.list_data_archives().map_err(CliError::from)?;
    Ok(sp_vfs::resolve_archive_order(
        &data_archives,
        &ini_archives,
        &plugins,
    ))
}
