use std::fs;
use std::path::{Path, PathBuf};

/// Locates auxiliary data (ROM images, sample banks) a track references by name
pub trait FileResolver: Send + Sync {
    /// Return the bytes of `name` as seen from the track at `requesting`, or `None`
    fn resolve(&self, requesting: &Path, name: &str) -> Option<Vec<u8>>;
}

/// Looks next to the requesting track first, then under an optional ROM directory
#[derive(Debug, Clone, Default)]
pub struct RomDirResolver {
    rom_dir: Option<PathBuf>,
}

impl RomDirResolver {
    pub fn new(rom_dir: Option<PathBuf>) -> Self {
        Self { rom_dir }
    }

    fn candidates(&self, requesting: &Path, name: &str) -> Vec<PathBuf> {
        // Only the file name is honored; references never climb out of the search roots
        let file_name = match Path::new(name).file_name() {
            Some(file_name) => file_name,
            None => return Vec::new(),
        };

        let mut candidates = Vec::with_capacity(2);
        if let Some(parent) = requesting.parent() {
            candidates.push(parent.join(file_name));
        }
        if let Some(rom_dir) = &self.rom_dir {
            candidates.push(rom_dir.join(file_name));
        }
        candidates
    }
}

impl FileResolver for RomDirResolver {
    fn resolve(&self, requesting: &Path, name: &str) -> Option<Vec<u8>> {
        for candidate in self.candidates(requesting, name) {
            match fs::read(&candidate) {
                Ok(bytes) => {
                    log::debug!("Resolved {} to {}", name, candidate.display());
                    return Some(bytes);
                }
                Err(_) => continue,
            }
        }

        log::warn!("Referenced file {} not found for {}", name, requesting.display());
        None
    }
}
