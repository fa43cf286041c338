//! tar.gz encoding of bundle trees
//!
//! Both directions stream: `write_tar_gz` writes into any `Write` and
//! `read_tar_gz` consumes any `Read`, so callers can connect them through a
//! pipe without holding the whole archive in memory.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};
use tar::{Archive, Builder, EntryType, Header};

use crate::error::{CoreError, Result};
use crate::fs::BundleFs;

/// Serialize a tree as a gzip-compressed tar stream
///
/// Entries are written in path order with fixed mode and mtime so the same
/// tree always produces the same archive.
pub fn write_tar_gz<W: Write>(fs: &BundleFs, writer: W) -> Result<W> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = Builder::new(encoder);

    for (path, content) in fs.iter() {
        add_bytes_to_archive(&mut builder, path, content)?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Serialize a tree into an in-memory tar.gz buffer
pub fn to_tar_gz(fs: &BundleFs) -> Result<Vec<u8>> {
    write_tar_gz(fs, Vec::new())
}

/// Decode a gzip-compressed tar stream into a tree
///
/// Directory entries are implied by file paths and skipped. Links and
/// special files are rejected, as are paths escaping the archive root.
pub fn read_tar_gz<R: Read>(reader: R) -> Result<BundleFs> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut fs = BundleFs::new();

    let entries = archive.entries().map_err(archive_error)?;
    for entry in entries {
        let mut entry = entry.map_err(archive_error)?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            continue;
        }
        let path = entry.path().map_err(archive_error)?.to_string_lossy().to_string();
        if !matches!(entry_type, EntryType::Regular | EntryType::Continuous) {
            return Err(CoreError::Archive {
                message: format!("unsupported entry type {:?} for {}", entry_type, path),
            });
        }

        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(archive_error)?;
        fs.insert(&path, data)?;
    }

    Ok(fs)
}

fn archive_error(e: std::io::Error) -> CoreError {
    CoreError::Archive {
        message: format!("read archive: {}", e),
    }
}

/// Add bytes to a tar archive with a given path
fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();

    builder.append_data(&mut header, archive_path, content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> BundleFs {
        let mut fs = BundleFs::new();
        fs.insert("chart/Chart.yaml", "apiVersion: v2\nname: demo\nversion: 0.1.0\n").unwrap();
        fs.insert("chart/templates/cm.yaml", "kind: ConfigMap\n").unwrap();
        fs.insert("chart/files/blob.bin", vec![0u8, 159, 146, 150]).unwrap();
        fs
    }

    #[test]
    fn test_archive_reproduces_tree() {
        let fs = sample_tree();
        let bytes = to_tar_gz(&fs).unwrap();
        let decoded = read_tar_gz(bytes.as_slice()).unwrap();
        assert_eq!(decoded, fs);
    }

    #[test]
    fn test_archive_is_deterministic() {
        let fs = sample_tree();
        assert_eq!(to_tar_gz(&fs).unwrap(), to_tar_gz(&fs).unwrap());
    }

    #[test]
    fn test_read_rejects_plain_bytes() {
        let err = read_tar_gz(&b"definitely not gzip"[..]).unwrap_err();
        assert!(matches!(err, CoreError::Archive { .. }), "got {err:?}");
    }

    #[test]
    fn test_read_rejects_gzip_without_tar() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[0xffu8; 1024]).unwrap();
        let bytes = encoder.finish().unwrap();

        assert!(read_tar_gz(bytes.as_slice()).is_err());
    }

    #[test]
    fn test_read_skips_directories() {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);

        let mut dir = Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_cksum();
        builder.append_data(&mut dir, "manifests/", std::io::empty()).unwrap();
        add_bytes_to_archive(&mut builder, "./manifests/a.yaml", b"kind: A").unwrap();

        let bytes = builder.into_inner().unwrap().finish().unwrap();
        let fs = read_tar_gz(bytes.as_slice()).unwrap();

        let paths: Vec<_> = fs.paths().collect();
        assert_eq!(paths, vec!["manifests/a.yaml"]);
    }

    #[test]
    fn test_read_rejects_symlinks() {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);

        let mut link = Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        link.set_link_name("/etc/passwd").unwrap();
        builder.append_data(&mut link, "evil", std::io::empty()).unwrap();

        let bytes = builder.into_inner().unwrap().finish().unwrap();
        let err = read_tar_gz(bytes.as_slice()).unwrap_err();
        assert!(err.to_string().contains("unsupported entry type"));
    }
}
