// afx-aio/src/extract.rs
// Archive detection and extraction for downloaded release assets.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use afx_common::error::{AfxError, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tracing::{debug, error, warn};
use xz2::read::XzDecoder;
use zip::ZipArchive;

use crate::fs as afx_fs;

const SNAPPY_MAGIC: &[u8] = b"\xff\x06\x00\x00sNaPpY";
const TAR_MAGIC_OFFSET: usize = 257;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarBz2,
    TarGz,
    TarLz4,
    TarSz,
    TarXz,
    Tar,
    Zip,
    Rar,
    Gz,
    Bz2,
    Lz4,
    Sz,
    Xz,
}

impl ArchiveFormat {
    /// Detects the format from the file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        let table: &[(&str, ArchiveFormat)] = &[
            (".tar.bz2", ArchiveFormat::TarBz2),
            (".tbz2", ArchiveFormat::TarBz2),
            (".tbz", ArchiveFormat::TarBz2),
            (".tar.gz", ArchiveFormat::TarGz),
            (".tgz", ArchiveFormat::TarGz),
            (".tar.lz4", ArchiveFormat::TarLz4),
            (".tlz4", ArchiveFormat::TarLz4),
            (".tar.sz", ArchiveFormat::TarSz),
            (".tsz", ArchiveFormat::TarSz),
            (".tar.xz", ArchiveFormat::TarXz),
            (".txz", ArchiveFormat::TarXz),
            (".tar", ArchiveFormat::Tar),
            (".zip", ArchiveFormat::Zip),
            (".rar", ArchiveFormat::Rar),
            (".gz", ArchiveFormat::Gz),
            (".bz2", ArchiveFormat::Bz2),
            (".lz4", ArchiveFormat::Lz4),
            (".sz", ArchiveFormat::Sz),
            (".xz", ArchiveFormat::Xz),
        ];
        table
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// Detects the format from the file contents.
    pub fn sniff(path: &Path) -> Result<Option<Self>> {
        let kind = infer::get_from_path(path)?;
        let format = match kind.map(|k| k.extension()) {
            Some("zip") => Some(ArchiveFormat::Zip),
            Some("tar") => Some(ArchiveFormat::Tar),
            Some("rar") => Some(ArchiveFormat::Rar),
            Some("gz") => Some(if wraps_tar(GzDecoder::new(File::open(path)?)) {
                ArchiveFormat::TarGz
            } else {
                ArchiveFormat::Gz
            }),
            Some("bz2") => Some(if wraps_tar(BzDecoder::new(File::open(path)?)) {
                ArchiveFormat::TarBz2
            } else {
                ArchiveFormat::Bz2
            }),
            Some("xz") => Some(if wraps_tar(XzDecoder::new(File::open(path)?)) {
                ArchiveFormat::TarXz
            } else {
                ArchiveFormat::Xz
            }),
            Some("lz4") => Some(
                if wraps_tar(lz4_flex::frame::FrameDecoder::new(File::open(path)?)) {
                    ArchiveFormat::TarLz4
                } else {
                    ArchiveFormat::Lz4
                },
            ),
            Some(_) => None,
            None => {
                if has_snappy_magic(path)? {
                    Some(
                        if wraps_tar(snap::read::FrameDecoder::new(File::open(path)?)) {
                            ArchiveFormat::TarSz
                        } else {
                            ArchiveFormat::Sz
                        },
                    )
                } else {
                    None
                }
            }
        };
        debug!("Sniffed {} as {:?}", path.display(), format);
        Ok(format)
    }
}

fn has_snappy_magic(path: &Path) -> Result<bool> {
    let mut buf = [0u8; 10];
    let mut file = File::open(path)?;
    let n = read_up_to(&mut file, &mut buf)?;
    Ok(n == buf.len() && buf == SNAPPY_MAGIC)
}

fn wraps_tar<R: Read>(mut reader: R) -> bool {
    let mut header = [0u8; 512];
    match read_up_to(&mut reader, &mut header) {
        Ok(n) if n >= TAR_MAGIC_OFFSET + 5 => {
            &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
        }
        _ => false,
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// What `unarchive` did with the downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unarchived {
    /// Contents extracted into the destination and the archive removed.
    Extracted(ArchiveFormat),
    /// Not an archive; renamed to the canonical binary path and made executable.
    Renamed(PathBuf),
    /// Not an archive and the canonical binary path already existed.
    Kept(PathBuf),
}

/// Extracts `archive` into `dest`, or treats it as a bare executable when no
/// archive format applies. `format` overrides name-based detection.
pub async fn unarchive(
    archive: &Path,
    dest: &Path,
    binary_name: &str,
    format: Option<ArchiveFormat>,
) -> Result<Unarchived> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    let binary_name = binary_name.to_string();
    tokio::task::spawn_blocking(move || {
        unarchive_blocking(&archive, &dest, &binary_name, format)
    })
    .await
    .map_err(|e| AfxError::Extract(format!("extraction task failed: {e}")))?
}

pub fn unarchive_blocking(
    archive: &Path,
    dest: &Path,
    binary_name: &str,
    format: Option<ArchiveFormat>,
) -> Result<Unarchived> {
    let Some(format) = format.or_else(|| ArchiveFormat::from_path(archive)) else {
        let target = dest.join(binary_name);
        if afx_fs::path_exists(&target) {
            debug!(
                "{} is not an archive and {} exists, leaving it in place",
                archive.display(),
                target.display()
            );
            return Ok(Unarchived::Kept(archive.to_path_buf()));
        }
        debug!(
            "{} is not an archive, installing as {}",
            archive.display(),
            target.display()
        );
        std::fs::rename(archive, &target)?;
        afx_fs::set_permissions(&target, 0o755)?;
        return Ok(Unarchived::Renamed(target));
    };

    debug!(
        "Extracting {} ({:?}) into {}",
        archive.display(),
        format,
        dest.display()
    );
    if !dest.is_dir() {
        return Err(AfxError::Extract(format!(
            "destination {} does not exist",
            dest.display()
        )));
    }

    let file = BufReader::new(File::open(archive)?);
    let result = match format {
        ArchiveFormat::Tar => extract_tar(file, dest).map(|_| None),
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(file), dest).map(|_| None),
        ArchiveFormat::TarBz2 => extract_tar(BzDecoder::new(file), dest).map(|_| None),
        ArchiveFormat::TarXz => extract_tar(XzDecoder::new(file), dest).map(|_| None),
        ArchiveFormat::TarLz4 => {
            extract_tar(lz4_flex::frame::FrameDecoder::new(file), dest).map(|_| None)
        }
        ArchiveFormat::TarSz => {
            extract_tar(snap::read::FrameDecoder::new(file), dest).map(|_| None)
        }
        ArchiveFormat::Zip => extract_zip(archive, dest).map(|_| None),
        ArchiveFormat::Gz => decompress(GzDecoder::new(file), archive, dest).map(Some),
        ArchiveFormat::Bz2 => decompress(BzDecoder::new(file), archive, dest).map(Some),
        ArchiveFormat::Xz => decompress(XzDecoder::new(file), archive, dest).map(Some),
        ArchiveFormat::Lz4 => {
            decompress(lz4_flex::frame::FrameDecoder::new(file), archive, dest).map(Some)
        }
        ArchiveFormat::Sz => {
            decompress(snap::read::FrameDecoder::new(file), archive, dest).map(Some)
        }
        ArchiveFormat::Rar => extract_rar(archive, dest).map(|_| None),
    };
    let produced = match result {
        Ok(produced) => produced,
        Err(e) => {
            error!("Failed to extract {}: {}", archive.display(), e);
            return Err(e);
        }
    };

    // A stream without an extension decompresses over itself.
    if produced.as_deref() != Some(archive) {
        afx_fs::remove_path(archive)?;
    }
    Ok(Unarchived::Extracted(format))
}

/// Overwrites existing entries, keeps the archive layout and stops at the first error.
fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    let entries = archive
        .entries()
        .map_err(|e| AfxError::Extract(format!("failed to read tar entries: {e}")))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| AfxError::Extract(format!("failed to read tar entry: {e}")))?;
        let entry_path = entry
            .path()
            .map(|p| p.into_owned())
            .unwrap_or_default();
        let unpacked = entry.unpack_in(dest).map_err(|e| {
            AfxError::Extract(format!(
                "failed to unpack {}: {e}",
                entry_path.display()
            ))
        })?;
        if !unpacked {
            warn!(
                "Skipped tar entry outside of {}: {}",
                dest.display(),
                entry_path.display()
            );
        }
    }
    Ok(())
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| AfxError::Extract(format!("failed to open zip: {e}")))?;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| AfxError::Extract(format!("failed to access zip entry: {e}")))?;
        let Some(relative) = file.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", file.name());
            continue;
        };
        let outpath = dest.join(relative);
        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if afx_fs::path_exists(&outpath) {
            afx_fs::remove_path(&outpath)?;
        }
        let mut outfile = File::create(&outpath)?;
        io::copy(&mut file, &mut outfile)
            .map_err(|e| AfxError::Extract(format!("failed to write {}: {e}", outpath.display())))?;
        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            afx_fs::set_permissions(&outpath, mode & 0o7777)?;
        }
    }
    Ok(())
}

fn extract_rar(archive_path: &Path, dest: &Path) -> Result<()> {
    let mut archive = unrar::Archive::new(archive_path)
        .open_for_processing()
        .map_err(|e| AfxError::Extract(format!("failed to open rar: {e}")))?;
    while let Some(header) = archive
        .read_header()
        .map_err(|e| AfxError::Extract(format!("failed to read rar entry: {e}")))?
    {
        let entry_path = header.entry().filename.clone();
        archive = if header.entry().is_file() {
            header.extract_with_base(dest)
        } else {
            header.skip()
        }
        .map_err(|e| {
            AfxError::Extract(format!("failed to unpack {}: {e}", entry_path.display()))
        })?;
    }
    Ok(())
}

/// Decompresses a single-file stream to the archive name minus its extension.
fn decompress<R: Read>(mut reader: R, archive: &Path, dest: &Path) -> Result<PathBuf> {
    let stem = archive
        .file_stem()
        .ok_or_else(|| AfxError::Extract(format!("{} has no file name", archive.display())))?;
    let outpath = dest.join(stem);
    let partial = dest.join(format!(".{}.partial", stem.to_string_lossy()));
    let mut outfile = File::create(&partial)?;
    if let Err(e) = io::copy(&mut reader, &mut outfile) {
        let _ = std::fs::remove_file(&partial);
        return Err(AfxError::Extract(format!(
            "failed to decompress {}: {e}",
            archive.display()
        )));
    }
    drop(outfile);
    if afx_fs::path_exists(&outpath) && outpath != archive {
        afx_fs::remove_path(&outpath)?;
    }
    std::fs::rename(&partial, &outpath)?;
    debug!("Decompressed {} to {}", archive.display(), outpath.display());
    Ok(outpath)
}
