// src/archive.rs
use anyhow::{anyhow, Context, Result};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use walkdir::WalkDir;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Supported archive formats. The value names follow the classic
/// shutil-style spelling (zip, tar, gztar, bztar, xztar); the file
/// extensions are the real ones (`.tar.gz`, not `.gztar`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ArchiveFormat {
    #[value(name = "zip")]
    Zip,
    #[value(name = "tar")]
    Tar,
    #[value(name = "gztar")]
    GzTar,
    #[value(name = "bztar")]
    BzTar,
    #[value(name = "xztar")]
    XzTar,
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveFormat::Zip => write!(f, "zip"),
            ArchiveFormat::Tar => write!(f, "tar"),
            ArchiveFormat::GzTar => write!(f, "gztar"),
            ArchiveFormat::BzTar => write!(f, "bztar"),
            ArchiveFormat::XzTar => write!(f, "xztar"),
        }
    }
}

impl ArchiveFormat {
    /// File extension appended to the backup name.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::GzTar => "tar.gz",
            ArchiveFormat::BzTar => "tar.bz2",
            ArchiveFormat::XzTar => "tar.xz",
        }
    }
}

/// Detects an archive format from the file name suffix. Bare `.gz`/`.bz2`/
/// `.xz` are decoded as compressed tar; a non-tar payload will surface as an
/// extraction failure later.
pub fn detect_format(path: &Path) -> Option<ArchiveFormat> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".gz") {
        Some(ArchiveFormat::GzTar)
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".bz2") {
        Some(ArchiveFormat::BzTar)
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") || name.ends_with(".xz") {
        Some(ArchiveFormat::XzTar)
    } else if name.ends_with(".tar") {
        Some(ArchiveFormat::Tar)
    } else if name.ends_with(".zip") {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

/// Packs `source` into an archive at `dest`, rooted so that extraction
/// reproduces the source's base name as the top-level entry. Returns the
/// archive size in bytes.
pub fn pack(source: &Path, format: ArchiveFormat, dest: &Path) -> Result<u64> {
    match format {
        ArchiveFormat::Zip => pack_zip(source, dest)?,
        ArchiveFormat::Tar => {
            let file = create_archive_file(dest)?;
            pack_tar(source, file)?;
        }
        ArchiveFormat::GzTar => {
            let file = create_archive_file(dest)?;
            let enc = pack_tar(source, GzEncoder::new(file, flate2::Compression::default()))?;
            enc.finish().context("failed to finish gzip stream")?;
        }
        ArchiveFormat::BzTar => {
            let file = create_archive_file(dest)?;
            let enc = pack_tar(source, BzEncoder::new(file, bzip2::Compression::default()))?;
            enc.finish().context("failed to finish bzip2 stream")?;
        }
        ArchiveFormat::XzTar => {
            let file = create_archive_file(dest)?;
            let enc = pack_tar(source, XzEncoder::new(file, 6))?;
            enc.finish().context("failed to finish xz stream")?;
        }
    }

    let metadata = fs::metadata(dest).context("failed to stat created archive")?;
    Ok(metadata.len())
}

/// Extracts the archive at `archive` into the directory `target`.
pub fn unpack(archive: &Path, format: ArchiveFormat, target: &Path) -> Result<()> {
    fs::create_dir_all(target)
        .with_context(|| format!("failed to create restore target: {}", target.display()))?;

    let file = File::open(archive)
        .with_context(|| format!("failed to open archive: {}", archive.display()))?;

    match format {
        ArchiveFormat::Zip => {
            let mut zip = zip::ZipArchive::new(file)
                .with_context(|| format!("failed to read zip archive: {}", archive.display()))?;
            zip.extract(target)
                .with_context(|| format!("failed to extract zip archive: {}", archive.display()))?;
        }
        ArchiveFormat::Tar => untar(file, target)?,
        ArchiveFormat::GzTar => untar(GzDecoder::new(file), target)?,
        ArchiveFormat::BzTar => untar(BzDecoder::new(file), target)?,
        ArchiveFormat::XzTar => untar(XzDecoder::new(file), target)?,
    }

    Ok(())
}

fn create_archive_file(dest: &Path) -> Result<File> {
    File::create(dest)
        .with_context(|| format!("failed to create archive file: {}", dest.display()))
}

fn untar<R: Read>(reader: R, target: &Path) -> Result<()> {
    Archive::new(reader)
        .unpack(target)
        .context("failed to unpack tar archive")
}

/// Writes source entries into a tar builder over `writer`, prefixed with the
/// source's base name, and finishes the archive.
fn pack_tar<W: Write>(source: &Path, writer: W) -> Result<W> {
    let base = base_name(source)?;
    let mut builder = Builder::new(writer);

    if source.is_dir() {
        builder
            .append_dir_all(&base, source)
            .with_context(|| format!("failed to append directory: {}", source.display()))?;
    } else {
        builder
            .append_path_with_name(source, &base)
            .with_context(|| format!("failed to append file: {}", source.display()))?;
    }

    builder.into_inner().context("failed to finish tar archive")
}

fn pack_zip(source: &Path, dest: &Path) -> Result<()> {
    use zip::write::SimpleFileOptions;

    let file = create_archive_file(dest)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let base = base_name(source)?;

    if source.is_file() {
        writer
            .start_file(base, options)
            .context("failed to start zip entry")?;
        let mut f = File::open(source)
            .with_context(|| format!("failed to open file: {}", source.display()))?;
        io::copy(&mut f, &mut writer).context("failed to write zip entry")?;
    } else {
        for entry in WalkDir::new(source).follow_links(false) {
            let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
            let rel = entry
                .path()
                .strip_prefix(source)
                .context("walked entry outside source root")?;

            let name = if rel.as_os_str().is_empty() {
                PathBuf::from(&base)
            } else {
                Path::new(&base).join(rel)
            };
            // Zip entry names always use forward slashes
            let name = name.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                writer
                    .add_directory(name, options)
                    .context("failed to add zip directory entry")?;
            } else if entry.file_type().is_file() {
                writer
                    .start_file(name, options)
                    .context("failed to start zip entry")?;
                let mut f = File::open(entry.path())
                    .with_context(|| format!("failed to open file: {}", entry.path().display()))?;
                io::copy(&mut f, &mut writer).context("failed to write zip entry")?;
            }
        }
    }

    writer.finish().context("failed to finish zip archive")?;
    Ok(())
}

fn base_name(source: &Path) -> Result<String> {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("source path has no base name: {}", source.display()))
}
