use std::io::Read;
use std::path::Path;

use log::{debug, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ArchiveError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

/// Extract a zip archive into `dest`, reporting each member's name as the
/// extraction advances. Entries whose names escape the destination are
/// skipped rather than failing the whole archive.
///
/// # Errors
/// Returns an error when the archive cannot be opened or a member cannot be
/// written to disk.
pub fn extract_zip<F>(zip_path: &Path, dest: &Path, mut on_entry: F) -> Result<(), ArchiveError>
where
    F: FnMut(&str),
{
    let file = std::fs::File::open(zip_path)
        .map_err(|e| ArchiveError::io("failed to open zip archive", e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ArchiveError::zip("failed to read zip archive", e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::zip("failed to read zip entry", e))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(&name);
        on_entry(&name.to_string_lossy());

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| ArchiveError::io("failed to create extracted directory", e))?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ArchiveError::io("failed to create extraction parent", e))?;
            }
            let mut outfile = std::fs::File::create(&out_path)
                .map_err(|e| ArchiveError::io("failed to create extracted file", e))?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| ArchiveError::io("failed to extract archive entry", e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ =
                        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
                }
            }
        }
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

/// Hex SHA-256 digest of a file, streamed in fixed-size blocks.
///
/// # Errors
/// Returns an error when the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, ArchiveError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| ArchiveError::io("failed to open file for checksum", e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| ArchiveError::io("failed to read file for checksum", e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::{extract_zip, sha256_file};

    fn write_test_zip(path: &std::path::Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        for (name, contents) in entries {
            writer
                .start_file(*name, options)
                .expect("zip entry should start");
            writer
                .write_all(contents)
                .expect("zip entry should be written");
        }
        writer.finish().expect("zip archive should be finalized");
    }

    #[test]
    fn extract_zip_expands_members_and_reports_names() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("update.zip");
        let dest = temp.path().join("out");
        write_test_zip(
            &zip_path,
            &[
                ("Starfall.jar", b"jar-bytes"),
                ("data/config.cfg", b"cfg-bytes"),
            ],
        );

        let mut seen = Vec::new();
        extract_zip(&zip_path, &dest, |name| seen.push(name.to_string()))
            .expect("archive should extract");

        assert_eq!(
            std::fs::read(dest.join("Starfall.jar")).expect("jar should be extracted"),
            b"jar-bytes"
        );
        assert_eq!(
            std::fs::read(dest.join("data/config.cfg")).expect("config should be extracted"),
            b"cfg-bytes"
        );
        assert_eq!(seen, vec!["Starfall.jar", "data/config.cfg"]);
    }

    #[test]
    fn extract_zip_skips_unsafe_paths() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let dest = temp.path().join("out");
        write_test_zip(&zip_path, &[("../escape.txt", b"nope")]);

        extract_zip(&zip_path, &dest, |_| {}).expect("extraction should not fail");

        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn sha256_file_returns_known_digest() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let file_path = temp.path().join("payload.bin");
        std::fs::write(&file_path, b"abc").expect("payload file should be written");

        let digest = sha256_file(&file_path).expect("checksum should be computed");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
