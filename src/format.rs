//! File-name based format classification.
//!
//! The importer and the playback orchestrator both go through [`classify`],
//! so a file is always inspected and played by the same engine family.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Archive containers accepted by the importer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Zip,
    /// RAR and RSN (RAR-packed SPC sets)
    Rar,
}

/// Format family of a file, decided by extension only
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// VGM / VGZ register dumps
    Vgm,
    /// NSF, GBS, SPC and other CPU-driven multi-song formats
    MultiTrackChip,
    /// MOD, XM, S3M, IT and friends
    Tracker,
    /// KSS and other MSX sound drivers
    Msx,
    /// Standard MIDI files
    Midi,
    Archive(ArchiveKind),
    Unsupported,
}

const VGM_EXTENSIONS: &[&str] = &["vgm", "vgz"];
const CHIP_EXTENSIONS: &[&str] = &[
    "nsf", "nsfe", "gbs", "spc", "hes", "ay", "sap", "gym", "psf", "minipsf",
];
const TRACKER_EXTENSIONS: &[&str] = &[
    "mod", "xm", "s3m", "it", "mptm", "stm", "669", "mtm", "med", "okt", "far", "ult", "umx",
    "dbm", "digi", "psm", "amf",
];
const MSX_EXTENSIONS: &[&str] = &["kss", "mgs", "bgm", "opx", "mpk", "mbm"];
const MIDI_EXTENSIONS: &[&str] = &["mid", "midi", "rmi", "smf"];

impl FormatKind {
    /// Human-readable family name
    pub fn name(&self) -> &'static str {
        match self {
            FormatKind::Vgm => "VGM",
            FormatKind::MultiTrackChip => "Chip",
            FormatKind::Tracker => "Tracker",
            FormatKind::Msx => "MSX",
            FormatKind::Midi => "MIDI",
            FormatKind::Archive(ArchiveKind::Zip) => "ZIP",
            FormatKind::Archive(ArchiveKind::Rar) => "RAR",
            FormatKind::Unsupported => "Unsupported",
        }
    }

    /// Whether an engine backend can play this family
    pub fn is_playable(&self) -> bool {
        matches!(
            self,
            FormatKind::Vgm
                | FormatKind::MultiTrackChip
                | FormatKind::Tracker
                | FormatKind::Msx
                | FormatKind::Midi
        )
    }

    /// Extensions recognized for this family
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FormatKind::Vgm => VGM_EXTENSIONS,
            FormatKind::MultiTrackChip => CHIP_EXTENSIONS,
            FormatKind::Tracker => TRACKER_EXTENSIONS,
            FormatKind::Msx => MSX_EXTENSIONS,
            FormatKind::Midi => MIDI_EXTENSIONS,
            FormatKind::Archive(ArchiveKind::Zip) => &["zip"],
            FormatKind::Archive(ArchiveKind::Rar) => &["rar", "rsn"],
            FormatKind::Unsupported => &[],
        }
    }
}

/// Classify a file name by its extension, case-insensitively
pub fn classify(file_name: &str) -> FormatKind {
    let extension = match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return FormatKind::Unsupported,
    };

    classify_extension(&extension)
}

/// Classify a path by its file name
pub fn classify_path(path: &Path) -> FormatKind {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(classify)
        .unwrap_or(FormatKind::Unsupported)
}

fn classify_extension(extension: &str) -> FormatKind {
    let families = [
        FormatKind::Vgm,
        FormatKind::MultiTrackChip,
        FormatKind::Tracker,
        FormatKind::Msx,
        FormatKind::Midi,
        FormatKind::Archive(ArchiveKind::Zip),
        FormatKind::Archive(ArchiveKind::Rar),
    ];

    families
        .into_iter()
        .find(|family| family.extensions().contains(&extension))
        .unwrap_or(FormatKind::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify("01 Opening.vgz"), FormatKind::Vgm);
        assert_eq!(classify("smb.nsf"), FormatKind::MultiTrackChip);
        assert_eq!(classify("ff6-01.spc"), FormatKind::MultiTrackChip);
        assert_eq!(classify("axelf.xm"), FormatKind::Tracker);
        assert_eq!(classify("gradius2.kss"), FormatKind::Msx);
        assert_eq!(classify("canyon.mid"), FormatKind::Midi);
        assert_eq!(classify("set.rsn"), FormatKind::Archive(ArchiveKind::Rar));
        assert_eq!(classify("pack.zip"), FormatKind::Archive(ArchiveKind::Zip));
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify("TRACK.VGM"), FormatKind::Vgm);
        assert_eq!(classify("Song.Mod"), FormatKind::Tracker);
        assert_eq!(classify("GAME.KSS"), FormatKind::Msx);
    }

    #[test]
    fn test_unknown_extensions_are_unsupported() {
        assert_eq!(classify("readme.txt"), FormatKind::Unsupported);
        assert_eq!(classify("cover.png"), FormatKind::Unsupported);
        assert_eq!(classify("noextension"), FormatKind::Unsupported);
        assert_eq!(classify(""), FormatKind::Unsupported);
        assert!(!FormatKind::Unsupported.is_playable());
    }

    #[test]
    fn test_extension_tables_do_not_overlap() {
        let families = [
            FormatKind::Vgm,
            FormatKind::MultiTrackChip,
            FormatKind::Tracker,
            FormatKind::Msx,
            FormatKind::Midi,
            FormatKind::Archive(ArchiveKind::Zip),
            FormatKind::Archive(ArchiveKind::Rar),
        ];

        for family in families {
            for ext in family.extensions() {
                let name = format!("file.{}", ext);
                assert_eq!(classify(&name), family, "{} classified differently", name);
            }
        }
    }

    #[test]
    fn test_classify_path_uses_file_name_only() {
        assert_eq!(
            classify_path(Path::new("/music/some.dir.zip/track.vgm")),
            FormatKind::Vgm
        );
        assert_eq!(classify_path(Path::new("/music/")), FormatKind::Unsupported);
    }
}
