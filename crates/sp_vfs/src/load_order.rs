//! Archive load-order resolution.
//!
//! The engine mounts archives from two sources: the `[Archive]` lists declared in
//! the game's INI files, and archives associated with each active plugin by name.
//! [`resolve_archive_order`] combines both into one duplicate-free list, lowest
//! priority first, which is what [`DataDirectory::populate`](crate::DataDirectory::populate)
//! consumes.
//!
//! Plugin association is by file name prefix. Because archive names are free text,
//! a plugin `3DNPC.esp` must own `3DNPC.bsa`, `3DNPC0.bsa` and `3DNPC - Textures.bsa`
//! but not `3DNPCOther.bsa`, which belongs to some other plugin whose name merely
//! starts with the same letters.

use crate::error::Result;
use camino::Utf8Path;
use ini::Ini;
use std::collections::HashSet;

/// INI keys under `[Archive]` that list archives, in the order the engine reads them.
pub const INI_ARCHIVE_FIELDS: &[&str] = &[
    "sResourceArchiveList",
    "sResourceArchiveList2",
    "sResourceArchiveListBeta",
];

const INI_ARCHIVE_SECTION: &str = "Archive";

/// Archives from `archive_names` that belong to `plugin`, in load order.
///
/// The exact `<plugin>.bsa` comes first; the remaining matches keep their input
/// order. A candidate sharing the plugin's name as a prefix is accepted only if
/// the remainder starts with a digit, or with a space followed by a dash.
///
/// # Arguments
///
/// * `archive_names` - Archive file names found in the data directory
/// * `plugin` - Plugin name, with or without its `.esp`/`.esm`/`.esl` extension
pub fn find_archives_for_plugin(archive_names: &[String], plugin: &str) -> Vec<String> {
    let plugin_stem = strip_plugin_extension(plugin).to_lowercase();
    let exact = format!("{}.bsa", plugin_stem);

    let mut matches = Vec::new();
    for name in archive_names {
        let lower = name.to_lowercase();
        if lower == exact {
            matches.insert(0, name.clone());
            continue;
        }

        let Some(stem) = lower.strip_suffix(".bsa") else {
            continue;
        };
        let Some(rest) = stem.strip_prefix(&plugin_stem) else {
            continue;
        };

        if let Some(after_space) = rest.strip_prefix(' ') {
            if !after_space.starts_with('-') {
                continue;
            }
        } else if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        matches.push(name.clone());
    }

    matches
}

fn strip_plugin_extension(plugin: &str) -> &str {
    let lower = plugin.to_ascii_lowercase();
    for ext in [".esp", ".esm", ".esl"] {
        if lower.ends_with(ext) {
            return &plugin[..plugin.len() - ext.len()];
        }
    }
    plugin
}

/// Read the archive lists declared in a sequence of INI files.
///
/// For each field in [`INI_ARCHIVE_FIELDS`], the last INI (in the given order)
/// that defines it with a non-empty value wins. Values are comma-separated and
/// trimmed. INI files that do not exist are skipped.
pub fn read_ini_archives(ini_paths: &[impl AsRef<Utf8Path>]) -> Result<Vec<String>> {
    let mut fields: Vec<Option<String>> = vec![None; INI_ARCHIVE_FIELDS.len()];

    for path in ini_paths {
        let path = path.as_ref();
        if !path.as_std_path().is_file() {
            tracing::debug!("INI not found, skipping: {}", path);
            continue;
        }

        let ini = Ini::load_from_file(path.as_std_path())?;
        let Some(section) = ini.section(Some(INI_ARCHIVE_SECTION)) else {
            continue;
        };

        for (idx, field) in INI_ARCHIVE_FIELDS.iter().enumerate() {
            if let Some(value) = section.get(*field) {
                if !value.trim().is_empty() {
                    fields[idx] = Some(value.to_string());
                }
            }
        }
    }

    let mut archives = Vec::new();
    for value in fields.into_iter().flatten() {
        for item in value.split(',') {
            let item = item.trim();
            if !item.is_empty() {
                archives.push(item.to_string());
            }
        }
    }

    Ok(archives)
}

/// Read the active plugins from a `plugins.txt` file.
///
/// Lines starting with `#` are comments. Active plugins are prefixed with `*`;
/// lines without the prefix are installed but inactive and are skipped.
pub fn read_active_plugins(plugins_txt: &Utf8Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(plugins_txt.as_std_path())?;
    Ok(parse_active_plugins(&contents))
}

fn parse_active_plugins(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|l| l.trim_start_matches('\u{feff}').trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.strip_prefix('*'))
        .map(|l| l.trim().to_string())
        .collect()
}

/// Combine INI-declared and plugin-associated archives into the final load order.
///
/// The result starts with `ini_archives` (in order), followed by each plugin's
/// archives in plugin activation order. Duplicates are dropped case-insensitively,
/// keeping the first occurrence. Archives in `data_archives` that end up in neither
/// list are reported with a warning and left out.
///
/// # Arguments
///
/// * `data_archives` - Archive file names present in the data directory
/// * `ini_archives` - Archives declared by INI files or manual configuration
/// * `active_plugins` - Active plugins in load order
pub fn resolve_archive_order(
    data_archives: &[String],
    ini_archives: &[String],
    active_plugins: &[String],
) -> Vec<String> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |name: &str, order: &mut Vec<String>| {
        if seen.insert(name.to_lowercase()) {
            order.push(name.to_string());
        }
    };

    for name in ini_archives {
        push(name, &mut order);
    }

    for plugin in active_plugins {
        for name in find_archives_for_plugin(data_archives, plugin) {
            push(&name, &mut order);
        }
    }

    let loaded: HashSet<String> = order.iter().map(|n| n.to_lowercase()).collect();
    for name in data_archives {
        if !loaded.contains(&name.to_lowercase()) {
            tracing::warn!(
                "Archive '{}' is not loaded by any plugin or INI file and will be ignored",
                name
            );
        }
    }

    tracing::info!("Resolved archive load order: {} archives", order.len());
    order
}
