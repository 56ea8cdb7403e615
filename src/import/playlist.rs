use std::fs;
use std::path::{Path, PathBuf};

/// One `filename[,title]` line of an archive playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub file_name: String,
    pub title: Option<String>,
}

/// Parse M3U content; `#` lines are comments
pub fn parse_m3u(content: &str) -> Vec<PlaylistEntry> {
    let content = content.trim_start_matches('\u{feff}');
    let mut entries = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (file_part, title) = match line.split_once(',') {
            Some((file, title)) => {
                let title = title.trim();
                (file, (!title.is_empty()).then(|| title.to_string()))
            }
            None => (line, None),
        };

        // Entries may carry a folder prefix from the ripper's machine
        let file_name = file_part
            .trim()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        if file_name.is_empty() {
            continue;
        }

        entries.push(PlaylistEntry { file_name, title });
    }

    entries
}

/// Load a playlist file, tolerating non-UTF-8 bytes
pub fn load_m3u(path: &Path) -> std::io::Result<Vec<PlaylistEntry>> {
    let bytes = fs::read(path)?;
    Ok(parse_m3u(&String::from_utf8_lossy(&bytes)))
}

/// Order `files` as listed in `entries`, matching file names case-insensitively.
///
/// Files the playlist does not mention follow in name order. Returns each file
/// with its playlist title, if any.
pub fn order_by_playlist(
    files: &[PathBuf],
    entries: &[PlaylistEntry],
) -> Vec<(PathBuf, Option<String>)> {
    let mut remaining: Vec<&PathBuf> = files.iter().collect();
    let mut ordered = Vec::with_capacity(files.len());

    for entry in entries {
        let wanted = entry.file_name.to_lowercase();
        let found = remaining.iter().position(|file| {
            file.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_lowercase() == wanted)
                .unwrap_or(false)
        });
        if let Some(index) = found {
            let file = remaining.remove(index);
            ordered.push((file.clone(), entry.title.clone()));
        } else {
            log::debug!("Playlist entry {} has no matching file", entry.file_name);
        }
    }

    sort_by_file_name(&mut remaining);
    ordered.extend(remaining.into_iter().map(|file| (file.clone(), None)));
    ordered
}

/// Sort paths lexicographically by file name
pub fn sort_by_file_name<P: AsRef<Path>>(files: &mut [P]) {
    files.sort_by(|a, b| {
        let a = a.as_ref().file_name().map(|n| n.to_string_lossy().to_lowercase());
        let b = b.as_ref().file_name().map(|n| n.to_string_lossy().to_lowercase());
        a.cmp(&b)
    });
}
