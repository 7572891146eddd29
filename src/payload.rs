//! Local file packaging
//!
//! Submitter-local files and jars travel to the driver inside the submission
//! request as base64-encoded gzipped tarballs. Archive entries are flat:
//! each file is stored under its base name.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::{Error, Result};

/// Compress a set of local files into a base64 tar+gzip blob.
///
/// An empty set yields a valid empty archive, so the driver side can always
/// unpack unconditionally.
pub fn encode_file_set(paths: &[PathBuf]) -> Result<String> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for path in paths {
        let name = path
            .file_name()
            .ok_or_else(|| Error::payload_encoding(format!("{} has no file name", path.display())))?
            .to_owned();
        builder
            .append_path_with_name(path, name)
            .map_err(|e| Error::payload_encoding(format!("{}: {}", path.display(), e)))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::payload_encoding(e.to_string()))?;
    let bytes = encoder
        .finish()
        .map_err(|e| Error::payload_encoding(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::io::Read;
    use std::sync::atomic::{AtomicU32, Ordering};

    use flate2::read::GzDecoder;

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "spark-submit-payload-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn unpack(blob: &str) -> BTreeMap<String, Vec<u8>> {
        let bytes = STANDARD.decode(blob).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(&bytes[..]));
        let mut entries = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            entries.insert(name, content);
        }
        entries
    }

    #[test]
    fn files_round_trip_through_the_archive() {
        let dir = scratch_dir();
        let a = dir.join("app.conf");
        let b = dir.join("data.bin");
        fs::write(&a, b"key=value").unwrap();
        fs::write(&b, [0u8, 1, 2, 3]).unwrap();

        let blob = encode_file_set(&[a, b]).unwrap();
        let entries = unpack(&blob);

        assert_eq!(entries.get("app.conf").unwrap(), b"key=value");
        assert_eq!(entries.get("data.bin").unwrap(), &[0u8, 1, 2, 3]);
    }

    #[test]
    fn entries_are_stored_flat_under_their_base_name() {
        let dir = scratch_dir();
        let nested = dir.join("nested");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("deep.txt");
        fs::write(&file, b"x").unwrap();

        let blob = encode_file_set(&[file]).unwrap();
        let entries = unpack(&blob);
        assert!(entries.contains_key("deep.txt"));
    }

    #[test]
    fn empty_set_yields_a_valid_empty_archive() {
        let blob = encode_file_set(&[]).unwrap();
        assert!(unpack(&blob).is_empty());
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let missing = PathBuf::from("/nonexistent/missing.jar");
        let err = encode_file_set(&[missing]).unwrap_err();
        assert!(matches!(err, Error::PayloadEncoding(_)));
        assert!(err.to_string().contains("missing.jar"));
    }
}
