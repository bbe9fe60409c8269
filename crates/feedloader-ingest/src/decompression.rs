//! Archive extraction into the working directory
//!
//! # Supported Formats
//!
//! - **Zip** (.zip): the vendor's default
//! - **Tar.gz** (.tar.gz, .tgz) and plain **Tar** (.tar)
//!
//! Entries are flattened to their file name, so an archive cannot write
//! outside the destination directory. Directory entries are skipped, and an
//! archive with two entries flattening to the same name is rejected.

use feedloader_common::{FeedError, Result};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Archive container formats recognised by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Unpack `archive` into `dest_dir`, returning the extracted files sorted by
/// name.
pub fn extract_archive(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let format = ArchiveFormat::from_path(archive).ok_or_else(|| {
        FeedError::Archive(format!("Unsupported archive type: {}", archive.display()))
    })?;

    std::fs::create_dir_all(dest_dir)?;
    let file = File::open(archive)?;

    let mut extracted = match format {
        ArchiveFormat::Zip => extract_zip(file, dest_dir)?,
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(file), dest_dir)?,
        ArchiveFormat::Tar => extract_tar(file, dest_dir)?,
    };
    extracted.sort();

    debug!(
        archive = %archive.display(),
        files = extracted.len(),
        dest = %dest_dir.display(),
        "Unpacked archive"
    );
    Ok(extracted)
}

fn flat_name(entry_name: &str) -> Option<&str> {
    entry_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

/// Flattened names already written, mapped to the entry they came from
#[derive(Default)]
struct FlatNames(HashMap<String, String>);

impl FlatNames {
    fn claim(&mut self, flat: &str, entry_name: &str) -> Result<()> {
        if let Some(first) = self.0.get(flat) {
            return Err(FeedError::Archive(format!(
                "Archive entries {} and {} both unpack to {}",
                first, entry_name, flat
            )));
        }
        self.0.insert(flat.to_string(), entry_name.to_string());
        Ok(())
    }
}

fn extract_zip(file: File, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| FeedError::Archive(format!("Failed to read zip archive: {}", e)))?;

    let mut extracted = Vec::new();
    let mut names = FlatNames::default();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| FeedError::Archive(format!("Failed to read zip entry {}: {}", i, e)))?;

        if entry.is_dir() {
            continue;
        }

        let Some(name) = flat_name(entry.name()).map(str::to_string) else {
            continue;
        };
        names.claim(&name, entry.name())?;
        let target = dest_dir.join(&name);
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted.push(target);
    }

    Ok(extracted)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();
    let mut names = FlatNames::default();

    let entries = archive
        .entries()
        .map_err(|e| FeedError::Archive(format!("Failed to read tar entries: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| FeedError::Archive(format!("Failed to read tar entry: {}", e)))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| FeedError::Archive(format!("Bad tar entry path: {}", e)))?
            .to_string_lossy()
            .into_owned();
        let Some(name) = flat_name(&path) else {
            continue;
        };
        names.claim(name, &path)?;

        let target = dest_dir.join(name);
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted.push(target);
    }

    Ok(extracted)
}
