//! Game installation layout.
//!
//! Locates the data directory, the INI files that declare archive lists, and the
//! `plugins.txt` activation list for a supported game. INI and plugin files live in
//! the user's documents and local app-data folders, which are resolved through
//! `directories-next` unless overridden.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::str::FromStr;

/// Supported games.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameType {
    SkyrimSE,
    SkyrimGog,
    SkyrimVR,
    Skyrim,
    Enderal,
    EnderalSE,
}

impl GameType {
    /// INI files read for archive lists, in engine order.
    pub fn ini_names(self) -> [&'static str; 3] {
        match self {
            GameType::Enderal | GameType::EnderalSE => {
                ["enderal.ini", "enderalprefs.ini", "enderalcustom.ini"]
            }
            _ => ["skyrim.ini", "skyrimprefs.ini", "skyrimcustom.ini"],
        }
    }

    /// Folder under the user's documents directory holding the INI files.
    pub fn documents_folder(self) -> &'static str {
        match self {
            GameType::SkyrimSE => "My Games/Skyrim Special Edition",
            GameType::SkyrimGog => "My Games/Skyrim Special Edition GOG",
            GameType::SkyrimVR => "My Games/Skyrim VR",
            GameType::Skyrim => "My Games/Skyrim",
            GameType::Enderal => "My Games/Enderal",
            GameType::EnderalSE => "My Games/Enderal Special Edition",
        }
    }

    /// Folder under local app data holding `plugins.txt`.
    pub fn appdata_folder(self) -> &'static str {
        match self {
            GameType::SkyrimSE => "Skyrim Special Edition",
            GameType::SkyrimGog => "Skyrim Special Edition GOG",
            GameType::SkyrimVR => "Skyrim VR",
            GameType::Skyrim => "Skyrim",
            GameType::Enderal => "Enderal",
            GameType::EnderalSE => "Enderal Special Edition",
        }
    }

    /// Master file whose presence identifies a valid data directory.
    pub fn master_file(self) -> &'static str {
        match self {
            GameType::SkyrimVR => "SkyrimVR.esm",
            GameType::Enderal | GameType::EnderalSE => "Enderal - Forgotten Stories.esm",
            _ => "Skyrim.esm",
        }
    }
}

impl FromStr for GameType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skyrimse" | "skyrim-se" => Ok(GameType::SkyrimSE),
            "skyrimgog" | "skyrim-gog" => Ok(GameType::SkyrimGog),
            "skyrimvr" | "skyrim-vr" => Ok(GameType::SkyrimVR),
            "skyrim" => Ok(GameType::Skyrim),
            "enderal" => Ok(GameType::Enderal),
            "enderalse" | "enderal-se" => Ok(GameType::EnderalSE),
            other => Err(Error::Other(format!("Unknown game type: {}", other))),
        }
    }
}

/// A located game installation.
#[derive(Debug, Clone)]
pub struct GameInstall {
    game_type: GameType,
    data_dir: Utf8PathBuf,
    documents_dir: Option<Utf8PathBuf>,
    appdata_dir: Option<Utf8PathBuf>,
}

impl GameInstall {
    /// Locate the data directory under `game_dir` and validate it.
    ///
    /// `game_dir` may be either the game root (containing `Data/`) or the data
    /// directory itself. The data directory must contain the game's master file.
    ///
    /// # Arguments
    ///
    /// * `game_type` - Which game is installed
    /// * `game_dir` - Game root or data directory
    pub fn locate(game_type: GameType, game_dir: &Utf8Path) -> Result<Self> {
        let master = game_type.master_file();
        let candidates = [game_dir.join("Data"), game_dir.to_path_buf()];

        let data_dir = candidates
            .into_iter()
            .find(|dir| contains_file_ci(dir, master))
            .ok_or_else(|| Error::InvalidDataDir(game_dir.to_path_buf()))?;

        tracing::info!("Game data directory: {}", data_dir);

        Ok(Self {
            game_type,
            data_dir,
            documents_dir: default_documents_dir(),
            appdata_dir: default_appdata_dir(),
        })
    }

    /// Override the user documents folder (where `My Games/...` INI files live).
    pub fn with_documents_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.documents_dir = Some(dir);
        self
    }

    /// Override the local app-data folder (where `plugins.txt` lives).
    pub fn with_appdata_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.appdata_dir = Some(dir);
        self
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    /// INI files to read archive lists from, in engine order.
    pub fn ini_paths(&self) -> Vec<Utf8PathBuf> {
        let Some(docs) = &self.documents_dir else {
            return Vec::new();
        };
        let folder = docs.join(self.game_type.documents_folder());
        self.game_type
            .ini_names()
            .iter()
            .map(|name| folder.join(name))
            .collect()
    }

    /// Location of `plugins.txt`, if the app-data folder is known.
    pub fn plugins_txt(&self) -> Option<Utf8PathBuf> {
        self.appdata_dir
            .as_ref()
            .map(|dir| dir.join(self.game_type.appdata_folder()).join("plugins.txt"))
    }
}

fn contains_file_ci(dir: &Utf8Path, name: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir.as_std_path()) else {
        return false;
    };
    entries
        .flatten()
        .any(|e| e.file_name().to_string_lossy().eq_ignore_ascii_case(name))
}

fn default_documents_dir() -> Option<Utf8PathBuf> {
    directories_next::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(|p| p.to_path_buf()))
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
}

fn default_appdata_dir() -> Option<Utf8PathBuf> {
    directories_next::BaseDirs::new()
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_from_game_root() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("Data").as_std_path()).unwrap();
        std::fs::write(root.join("Data/skyrim.ESM").as_std_path(), b"").unwrap();

        let game = GameInstall::locate(GameType::SkyrimSE, &root).unwrap();
        assert_eq!(game.data_dir(), root.join("Data"));
    }

    #[test]
    fn test_locate_from_data_dir() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::write(root.join("SkyrimVR.esm").as_std_path(), b"").unwrap();

        let game = GameInstall::locate(GameType::SkyrimVR, &root).unwrap();
        assert_eq!(game.data_dir(), root);
    }

    #[test]
    fn test_locate_missing_master_fails() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let err = GameInstall::locate(GameType::SkyrimSE, &root).unwrap_err();
        assert!(matches!(err, Error::InvalidDataDir(_)));
    }

    #[test]
    fn test_ini_and_plugin_paths() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::write(root.join("Skyrim.esm").as_std_path(), b"").unwrap();

        let game = GameInstall::locate(GameType::SkyrimSE, &root)
            .unwrap()
            .with_documents_dir(Utf8PathBuf::from("/docs"))
            .with_appdata_dir(Utf8PathBuf::from("/appdata"));

        let inis = game.ini_paths();
        assert_eq!(inis.len(), 3);
        assert_eq!(
            inis[0],
            Utf8PathBuf::from("/docs/My Games/Skyrim Special Edition/skyrim.ini")
        );
        assert_eq!(
            game.plugins_txt().unwrap(),
            Utf8PathBuf::from("/appdata/Skyrim Special Edition/plugins.txt")
        );
    }

    #[test]
    fn test_game_type_from_str() {
        assert_eq!("SkyrimSE".parse::<GameType>().unwrap(), GameType::SkyrimSE);
        assert_eq!("enderal-se".parse::<GameType>().unwrap(), GameType::EnderalSE);
        assert!("fallout4".parse::<GameType>().is_err());
    }
}
