//! Snapshot export container contract
//!
//! The bulk export subsystem is an external collaborator; the sync engine
//! never calls it. What lives here is the contract it must satisfy — the
//! exporter trait, its options, and the container helpers every
//! implementation shares: the SHA-256 checksum sidecar and threshold-based
//! file splitting with a split manifest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use sync_common::{SyncError, SyncResult};

/// Name of the checksum sidecar at the archive root
pub const CHECKSUM_FILE: &str = "checksums.sha256";

/// Extensions covered by the checksum sidecar
const CHECKSUM_EXTENSIONS: &[&str] = &["json", "sql", "gz", "mbz"];

/// Produces a snapshot archive and returns its path
#[async_trait]
pub trait SnapshotExporter: Send + Sync {
    async fn snapshot(&self, options: &ExportOptions) -> SyncResult<PathBuf>;
}

/// Options for a snapshot run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportOptions {
    pub include_users: bool,
    pub include_courses: bool,
    pub include_config: bool,
    pub include_plugins: bool,
    pub include_moodledata: bool,
    pub include_database: bool,
    /// Zip compression level in `[0, 9]`
    pub compression_level: u32,
    /// Gzip the SQL dump before packaging
    pub gzip_sql: bool,
    /// Split any file larger than this many bytes into parts
    pub split_threshold: Option<u64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_users: true,
            include_courses: true,
            include_config: true,
            include_plugins: true,
            include_moodledata: true,
            include_database: true,
            compression_level: 6,
            gzip_sql: true,
            split_threshold: None,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> SyncResult<()> {
        if self.compression_level > 9 {
            return Err(SyncError::validation(format!(
                "compression level {} is outside [0, 9]",
                self.compression_level
            )));
        }
        if self.split_threshold == Some(0) {
            return Err(SyncError::validation("split threshold must be positive"));
        }
        Ok(())
    }
}

/// Manifest JSON written at the archive root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportManifest {
    /// Component subtrees present in the archive (`users`, `courses`,
    /// `config`, `plugins`, `moodledata`, `database`)
    pub components: Vec<String>,
    pub compression_level: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ExportManifest {
    /// Manifest for the components the options enable
    pub fn for_options(options: &ExportOptions) -> Self {
        let toggles = [
            ("users", options.include_users),
            ("courses", options.include_courses),
            ("config", options.include_config),
            ("plugins", options.include_plugins),
            ("moodledata", options.include_moodledata),
            ("database", options.include_database),
        ];
        Self {
            components: toggles
                .into_iter()
                .filter(|(_, enabled)| *enabled)
                .map(|(name, _)| name.to_string())
                .collect(),
            compression_level: options.compression_level,
            created_at: chrono::Utc::now(),
        }
    }
}

/// One part of a split file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitPart {
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

/// Manifest written next to the parts as `<name>.split.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitManifest {
    pub original_name: String,
    pub total_size: u64,
    pub part_size: u64,
    pub parts: Vec<SplitPart>,
}

/// Streaming SHA-256 of a file, as lowercase hex
pub fn sha256_hex(path: &Path) -> SyncResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write the `checksums.sha256` sidecar for an export tree.
///
/// Covers every `.json`, `.sql`, `.gz`, and course-archive (`.mbz`) file
/// beneath `root`, in sorted relative-path order, one `<hex>  <path>` line
/// each. Returns the sidecar path.
pub fn write_checksums(root: &Path) -> SyncResult<PathBuf> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.sort();

    let sidecar = root.join(CHECKSUM_FILE);
    let mut out = File::create(&sidecar)?;
    for relative in &files {
        let digest = sha256_hex(&root.join(relative))?;
        writeln!(out, "{}  {}", digest, relative.display())?;
    }
    Ok(sidecar)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> SyncResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if has_checksum_extension(&path) {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}

fn has_checksum_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CHECKSUM_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Split a file into `<stem>.partNNN[.<ext>]` pieces of at most
/// `part_size` bytes, write the `<name>.split.json` manifest, and remove
/// the original. Files at or under the threshold are left alone
/// (`Ok(None)`).
pub fn split_file(path: &Path, part_size: u64) -> SyncResult<Option<SplitManifest>> {
    if part_size == 0 {
        return Err(SyncError::validation("part size must be positive"));
    }

    let total_size = fs::metadata(path)?.len();
    if total_size <= part_size {
        return Ok(None);
    }

    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SyncError::validation("split target has no file name"))?;
    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), Some(ext.to_string())),
        None => (file_name.to_string(), None),
    };

    let mut input = File::open(path)?;
    let mut parts = Vec::new();
    let mut index = 1u32;
    let mut remaining = total_size;

    while remaining > 0 {
        let this_part = remaining.min(part_size);
        let part_name = match &extension {
            Some(ext) => format!("{}.part{:03}.{}", stem, index, ext),
            None => format!("{}.part{:03}", stem, index),
        };
        let part_path = directory.join(&part_name);

        let mut taken = (&mut input).take(this_part);
        let mut out = File::create(&part_path)?;
        std::io::copy(&mut taken, &mut out)?;
        out.flush()?;

        parts.push(SplitPart {
            sha256: sha256_hex(&part_path)?,
            name: part_name,
            size: this_part,
        });
        remaining -= this_part;
        index += 1;
    }

    let manifest = SplitManifest {
        original_name: file_name.to_string(),
        total_size,
        part_size,
        parts,
    };

    let manifest_path = directory.join(format!("{}.split.json", file_name));
    fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;
    fs::remove_file(path)?;

    Ok(Some(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn options_validate_compression_level() {
        let mut options = ExportOptions::default();
        assert!(options.validate().is_ok());
        options.compression_level = 10;
        assert!(options.validate().is_err());
    }

    #[test]
    fn manifest_lists_enabled_components() {
        let options = ExportOptions {
            include_plugins: false,
            include_moodledata: false,
            ..Default::default()
        };
        let manifest = ExportManifest::for_options(&options);
        assert_eq!(
            manifest.components,
            vec!["users", "courses", "config", "database"]
        );
        assert_eq!(manifest.compression_level, 6);
    }

    #[test]
    fn checksums_cover_expected_extensions() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("users")).unwrap();
        fs::write(dir.path().join("manifest.json"), b"{}").unwrap();
        fs::write(dir.path().join("users/users.json"), b"[]").unwrap();
        fs::write(dir.path().join("dump.sql"), b"SELECT 1;").unwrap();
        fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let sidecar = write_checksums(dir.path()).unwrap();
        let content = fs::read_to_string(sidecar).unwrap();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(content.contains("manifest.json"));
        assert!(content.contains("users/users.json"));
        assert!(content.contains("dump.sql"));
        assert!(!content.contains("readme.txt"));
        // Each line is "<64 hex chars>  <path>"
        for line in lines {
            let (digest, _) = line.split_once("  ").unwrap();
            assert_eq!(digest.len(), 64);
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn small_file_is_not_split() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.sql");
        fs::write(&path, b"tiny").unwrap();

        assert!(split_file(&path, 1024).unwrap().is_none());
        assert!(path.exists());
    }

    #[test]
    fn large_file_splits_and_reassembles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.sql.gz");
        let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &payload).unwrap();

        let manifest = split_file(&path, 1000).unwrap().unwrap();
        assert_eq!(manifest.total_size, 2500);
        assert_eq!(manifest.parts.len(), 3);
        assert_eq!(manifest.parts[0].name, "dump.sql.part001.gz");
        assert_eq!(manifest.parts[2].size, 500);
        assert!(!path.exists());

        // Concatenated parts equal the original content
        let mut reassembled = Vec::new();
        for part in &manifest.parts {
            let bytes = fs::read(dir.path().join(&part.name)).unwrap();
            assert_eq!(bytes.len() as u64, part.size);
            assert_eq!(sha256_hex(&dir.path().join(&part.name)).unwrap(), part.sha256);
            reassembled.extend(bytes);
        }
        assert_eq!(reassembled, payload);

        // Manifest file exists alongside the parts
        let manifest_path = dir.path().join("dump.sql.gz.split.json");
        let stored: SplitManifest =
            serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
        assert_eq!(stored, manifest);
    }
}
