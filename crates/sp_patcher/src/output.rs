//! Output directory checks, cleanup and zip packaging.

use crate::diff::DIFF_FILE;
use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::File;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// File name of the packaged output.
pub const OUTPUT_ZIP: &str = "ShaderPatcher_Output.zip";

const GENERATED_FOLDERS: [&str; 2] = ["meshes", "textures"];
const GENERATED_FILES: [&str; 2] = [DIFF_FILE, OUTPUT_ZIP];
/// Left in place by mod managers; never deleted.
const IGNORED_FILES: [&str; 1] = ["meta.ini"];

/// Reject an output directory that is the data directory or inside it.
pub fn check_output_dir(output: &Utf8Path, data: &Utf8Path) -> Result<()> {
    let output_abs = absolute(output)?;
    let data_abs = absolute(data)?;
    if output_abs.starts_with(&data_abs) {
        return Err(Error::OutputInsideData {
            output: output.to_path_buf(),
            data: data.to_path_buf(),
        });
    }
    Ok(())
}

/// Delete a previous run's output.
///
/// Refuses with [`Error::UnsafeOutputDir`] when the directory holds anything the
/// patcher does not produce. A missing directory is not an error.
///
/// # Arguments
///
/// * `dir` - Output directory
/// * `remove_zip` - Also delete a previous output zip
pub fn clean_output_dir(dir: &Utf8Path, remove_zip: bool) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let mut to_delete = Vec::new();
    for entry in std::fs::read_dir(dir.as_std_path())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type()?;
        let known = if file_type.is_dir() {
            GENERATED_FOLDERS.iter().any(|f| f.eq_ignore_ascii_case(&name))
        } else {
            GENERATED_FILES.iter().any(|f| f.eq_ignore_ascii_case(&name))
                || IGNORED_FILES.iter().any(|f| f.eq_ignore_ascii_case(&name))
        };
        if !known {
            return Err(Error::UnsafeOutputDir {
                dir: dir.to_path_buf(),
                entry: name,
            });
        }

        let is_zip = name.eq_ignore_ascii_case(OUTPUT_ZIP);
        let ignored = IGNORED_FILES.iter().any(|f| f.eq_ignore_ascii_case(&name));
        if !ignored && (!is_zip || remove_zip) {
            to_delete.push((entry.path(), file_type.is_dir()));
        }
    }

    tracing::info!("Deleting old output files from {}", dir);
    for (path, is_dir) in to_delete {
        if is_dir {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Pack every file under `dir` into [`OUTPUT_ZIP`] and remove the packed files.
///
/// Returns the path of the written zip.
pub fn zip_output(dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let zip_path = dir.join(OUTPUT_ZIP);
    if zip_path.exists() {
        tracing::info!("Deleting existing output zip: {}", zip_path);
        std::fs::remove_file(&zip_path)?;
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir.as_std_path()).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Other(format!("Failed to walk {}: {}", dir, e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir.as_std_path())
            .map_err(|e| Error::Other(e.to_string()))?;
        let name = relative.to_string_lossy().replace('\\', "/");
        if IGNORED_FILES.iter().any(|f| f.eq_ignore_ascii_case(&name)) {
            continue;
        }
        files.push((entry.path().to_path_buf(), name));
    }

    let mut zip = ZipWriter::new(File::create(zip_path.as_std_path())?);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (path, name) in &files {
        zip.start_file(name.as_str(), options)?;
        let mut file = File::open(path)?;
        std::io::copy(&mut file, &mut zip)?;
    }
    zip.finish()?;
    tracing::info!("Packed {} files into {}", files.len(), zip_path);

    clean_output_dir(dir, false)?;
    Ok(zip_path)
}

/// Canonical form of `path`, resolving the nearest existing ancestor.
fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf> {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();
    while !existing.as_str().is_empty() && !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_string());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut resolved = if existing.as_str().is_empty() {
        let cwd = std::env::current_dir()?.canonicalize()?;
        Utf8PathBuf::from_path_buf(cwd)
            .map_err(|p| Error::Other(format!("Non UTF-8 path: {}", p.display())))?
    } else {
        existing.canonicalize_utf8()?
    };
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn temp_dir() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    fn test_output_inside_data_rejected() {
        let (_temp, root) = temp_dir();
        let data = root.join("data");
        std::fs::create_dir_all(&data).unwrap();

        assert!(matches!(
            check_output_dir(&data, &data),
            Err(Error::OutputInsideData { .. })
        ));
        assert!(matches!(
            check_output_dir(&data.join("out"), &data),
            Err(Error::OutputInsideData { .. })
        ));
        assert!(check_output_dir(&root.join("out"), &data).is_ok());
    }

    #[test]
    fn test_clean_refuses_foreign_files() {
        let (_temp, root) = temp_dir();
        std::fs::create_dir_all(root.join("meshes")).unwrap();
        std::fs::write(root.join("notes.txt"), "mine").unwrap();

        let err = clean_output_dir(&root, true).unwrap_err();
        assert!(matches!(err, Error::UnsafeOutputDir { ref entry, .. } if entry == "notes.txt"));
        assert!(root.join("meshes").exists());
    }

    #[test]
    fn test_clean_removes_generated_entries() {
        let (_temp, root) = temp_dir();
        std::fs::create_dir_all(root.join("meshes/sub")).unwrap();
        std::fs::write(root.join("meshes/sub/a.nif"), "x").unwrap();
        std::fs::write(root.join(DIFF_FILE), "{}").unwrap();
        std::fs::write(root.join(OUTPUT_ZIP), "zip").unwrap();
        std::fs::write(root.join("meta.ini"), "[General]").unwrap();

        clean_output_dir(&root, false).unwrap();
        assert!(!root.join("meshes").exists());
        assert!(!root.join(DIFF_FILE).exists());
        assert!(root.join(OUTPUT_ZIP).exists());
        assert!(root.join("meta.ini").exists());

        clean_output_dir(&root, true).unwrap();
        assert!(!root.join(OUTPUT_ZIP).exists());
    }

    #[test]
    fn test_zip_output_packs_and_removes() {
        let (_temp, root) = temp_dir();
        std::fs::create_dir_all(root.join("meshes/rocks")).unwrap();
        std::fs::write(root.join("meshes/rocks/a.nif"), "mesh").unwrap();
        std::fs::write(root.join(DIFF_FILE), "{}").unwrap();

        let zip_path = zip_output(&root).unwrap();
        assert!(!root.join("meshes").exists());
        assert!(!root.join(DIFF_FILE).exists());

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec![DIFF_FILE.to_string(), "meshes/rocks/a.nif".to_string()]);

        let mut contents = String::new();
        archive
            .by_name("meshes/rocks/a.nif")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "mesh");
    }
}
