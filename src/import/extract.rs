//! ZIP / RAR extraction into the library folder.

use crate::error::ImportError;
use crate::format::ArchiveKind;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";

/// Identify an archive by its leading bytes
pub fn sniff(header: &[u8]) -> Option<ArchiveKind> {
    if header.starts_with(ZIP_MAGIC) || header.starts_with(ZIP_EMPTY_MAGIC) {
        Some(ArchiveKind::Zip)
    } else if header.starts_with(RAR_MAGIC) {
        Some(ArchiveKind::Rar)
    } else {
        None
    }
}

/// Identify an archive file on disk by its leading bytes
pub fn sniff_file(path: &Path) -> io::Result<Option<ArchiveKind>> {
    let mut header = [0u8; 8];
    let mut file = File::open(path)?;
    let mut read = 0;
    while read < header.len() {
        match file.read(&mut header[read..])? {
            0 => break,
            n => read += n,
        }
    }
    Ok(sniff(&header[..read]))
}

/// Extract `archive` into `dest`, returning every file written
pub fn extract(kind: ArchiveKind, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ImportError> {
    fs::create_dir_all(dest)?;
    match kind {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::Rar => extract_rar(archive, dest),
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ImportError> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut written = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            log::warn!("Skipping unsafe ZIP entry {}", entry.name());
            continue;
        };

        let out_path = dest.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        written.push(out_path);
    }

    log::debug!("Extracted {} ZIP entries from {}", written.len(), archive.display());
    Ok(written)
}

fn extract_rar(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ImportError> {
    let rar_error = |e: unrar::error::UnrarError| ImportError::Rar(e.to_string());

    let mut open = unrar::Archive::new(archive)
        .open_for_processing()
        .map_err(rar_error)?;
    let mut written = Vec::new();

    while let Some(header) = open.read_header().map_err(rar_error)? {
        let entry = header.entry();
        let escapes = entry
            .filename
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));

        open = if entry.is_file() && !escapes {
            written.push(dest.join(&entry.filename));
            header.extract_with_base(dest).map_err(rar_error)?
        } else {
            if escapes {
                log::warn!("Skipping unsafe RAR entry {}", entry.filename.display());
            }
            header.skip().map_err(rar_error)?
        };
    }

    log::debug!("Extracted {} RAR entries from {}", written.len(), archive.display());
    Ok(written)
}

/// Every regular file below `dir`, sorted by path
pub fn walk_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    /// Stored RAR 4 archive: two SPC files under `Chrono Trigger/` plus a
    /// `../escape.spc` entry that points outside the destination
    pub(crate) const CHRONO_RSN: &[u8] = include_bytes!("../../testdata/chrono.rsn");

    /// Build a ZIP from (name, contents) pairs
    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_sniff_magic() {
        assert_eq!(sniff(b"PK\x03\x04rest"), Some(ArchiveKind::Zip));
        assert_eq!(sniff(b"PK\x05\x06"), Some(ArchiveKind::Zip));
        assert_eq!(sniff(b"Rar!\x1a\x07\x00"), Some(ArchiveKind::Rar));
        assert_eq!(sniff(b"Vgm "), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn test_extract_zip_keeps_folders() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("pack.zip");
        fs::write(
            &archive,
            build_zip(&[("01.vgz", b"one"), ("extra/notes.txt", b"hi")]),
        )
        .unwrap();

        assert_eq!(sniff_file(&archive).unwrap(), Some(ArchiveKind::Zip));

        let dest = dir.path().join("out");
        let written = extract(ArchiveKind::Zip, &archive, &dest).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(fs::read(dest.join("01.vgz")).unwrap(), b"one");
        assert_eq!(fs::read(dest.join("extra").join("notes.txt")).unwrap(), b"hi");

        let walked = walk_files(&dest).unwrap();
        assert_eq!(walked, vec![dest.join("01.vgz"), dest.join("extra").join("notes.txt")]);
    }

    #[test]
    fn test_extract_rar_skips_unsafe_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("chrono.rsn");
        fs::write(&archive, CHRONO_RSN).unwrap();
        assert_eq!(sniff_file(&archive).unwrap(), Some(ArchiveKind::Rar));

        let dest = dir.path().join("out");
        let mut written = extract(ArchiveKind::Rar, &archive, &dest).unwrap();
        written.sort();

        let game = dest.join("Chrono Trigger");
        assert_eq!(written, vec![game.join("01 Title.spc"), game.join("02 Theme.spc")]);
        assert_eq!(
            fs::read(game.join("02 Theme.spc")).unwrap(),
            b"SNES-SPC700 Sound File Data v0.30 theme"
        );
        assert!(!dir.path().join("escape.spc").exists());
        assert_eq!(walk_files(&dest).unwrap(), written);
    }

    #[test]
    fn test_extract_non_rar_fails() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.rsn");
        fs::write(&archive, b"this is not a rar archive").unwrap();

        let result = extract(ArchiveKind::Rar, &archive, &dir.path().join("out"));
        assert!(matches!(result, Err(ImportError::Rar(_))));
    }

    #[test]
    fn test_extract_corrupt_zip_fails() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"PK\x03\x04 definitely not a zip").unwrap();

        let result = extract(ArchiveKind::Zip, &archive, &dir.path().join("out"));
        assert!(matches!(result, Err(ImportError::Zip(_))));
    }
}
