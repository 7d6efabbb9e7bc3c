//! Filesystem target with atomic updates.
//!
//! Layout inside a certificate directory:
//!
//! ```text
//! <dir>/..certs_<timestamp>/cert
//! <dir>/..certs_<timestamp>/key
//! <dir>/..data -> ..certs_<timestamp>
//! <dir>/cert   -> ..data/cert
//! <dir>/key    -> ..data/key
//! ```
//!
//! An update writes a complete new generation directory, points a temporary
//! symlink at it and renames that over `..data`. `rename(2)` replaces the
//! link atomically, so a reader resolving `..data` sees either the old pair
//! or the new pair. Old generations are left in place.
//!
//! A directory that still holds plain `cert`/`key` files is adopted on the
//! first write: the existing pair becomes the first generation and the files
//! turn into links to identical content before the new pair is published.

use crate::binding::Destination;
use crate::error::CertSyncError;
use crate::target::{unsupported, TargetStore};
use crate::vault::CertMaterial;
use async_trait::async_trait;
use scopeguard::ScopeGuard;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{symlink, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DATA_LINK: &str = "..data";
pub const CERT_FILE: &str = "cert";
pub const KEY_FILE: &str = "key";
const DATA_TMP_LINK: &str = "..data_tmp";
const GENERATION_PREFIX: &str = "..certs_";

/// One certificate directory maintained with the symlink-swap layout.
#[derive(Debug, Clone)]
pub struct AtomicCertDir {
    dir: PathBuf,
}

impl AtomicCertDir {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Reads the current pair. `..data` is resolved once so both files come
    /// from the same generation. Directories without `..data` fall back to
    /// plain `cert`/`key` files.
    pub fn read(&self) -> io::Result<Option<CertMaterial>> {
        let generation = match fs::read_link(self.dir.join(DATA_LINK)) {
            Ok(target) => self.dir.join(target),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.dir.clone(),
            Err(e) => return Err(e),
        };
        let cert = read_optional(&generation.join(CERT_FILE))?;
        let key = read_optional(&generation.join(KEY_FILE))?;
        match (cert, key) {
            (Some(cert), Some(key)) => Ok(Some(CertMaterial { cert, key })),
            _ => Ok(None),
        }
    }

    /// Publishes `material` as a new generation and returns its path.
    pub fn write(&self, material: &CertMaterial) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        self.adopt_plain_files()?;
        let generation = self.publish(material)?;
        self.link_files()?;
        sync_dir(&self.dir)?;
        debug!("Published {}", generation.display());
        Ok(generation)
    }

    /// Moves a directory holding plain `cert`/`key` files onto the symlink
    /// layout without changing what they contain. The existing pair becomes
    /// the first generation and each file is replaced by a link resolving to
    /// identical content, so the later `..data` swap flips both at once.
    fn adopt_plain_files(&self) -> io::Result<()> {
        match fs::symlink_metadata(self.dir.join(DATA_LINK)) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let cert = read_optional(&self.dir.join(CERT_FILE))?;
        let key = read_optional(&self.dir.join(KEY_FILE))?;
        if let (Some(cert), Some(key)) = (cert, key) {
            let generation = self.publish(&CertMaterial { cert, key })?;
            self.link_files()?;
            info!(
                "Adopted plain certificate files in {} as {}",
                self.dir.display(),
                generation.display()
            );
        }
        Ok(())
    }

    /// Writes a complete generation and points `..data` at it.
    fn publish(&self, material: &CertMaterial) -> io::Result<PathBuf> {
        let generation = self.new_generation()?;
        // Until `..data` points at it, a failed write leaves no trace.
        let guard = scopeguard::guard(generation, |path| {
            let _ = fs::remove_dir_all(&path);
        });

        write_file(&guard.join(CERT_FILE), material.cert.as_bytes(), 0o644)?;
        write_file(&guard.join(KEY_FILE), material.key.as_bytes(), 0o600)?;
        sync_dir(&guard)?;

        let name = guard
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "generation has no name"))?;
        self.swap_link(DATA_LINK, &name)?;
        Ok(ScopeGuard::into_inner(guard))
    }

    /// Points `cert` and `key` through `..data`, leaving correct links alone.
    fn link_files(&self) -> io::Result<()> {
        for file in [CERT_FILE, KEY_FILE] {
            let target = Path::new(DATA_LINK).join(file);
            if fs::read_link(self.dir.join(file)).ok().as_deref() != Some(target.as_path()) {
                self.swap_link(file, &target)?;
            }
        }
        Ok(())
    }

    fn new_generation(&self) -> io::Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y_%m_%d_%H_%M_%S%.9f").to_string();
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{}{}", GENERATION_PREFIX, stamp)
            } else {
                format!("{}{}_{}", GENERATION_PREFIX, stamp, suffix)
            };
            let path = self.dir.join(name);
            match fs::create_dir(&path) {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Atomically (re)points `<dir>/<link>` at `target` via a temporary
    /// link renamed over the old one.
    fn swap_link(&self, link: &str, target: &Path) -> io::Result<()> {
        let tmp = if link == DATA_LINK {
            self.dir.join(DATA_TMP_LINK)
        } else {
            self.dir.join(format!("..{}_tmp", link))
        };
        match fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        symlink(target, &tmp)?;
        fs::rename(&tmp, self.dir.join(link))
    }
}

fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// [`TargetStore`] for [`Destination::Files`].
#[derive(Debug, Clone, Default)]
pub struct FileTargetStore;

impl FileTargetStore {
    pub fn new() -> Self {
        Self
    }

    fn cert_dir(destination: &Destination) -> Result<AtomicCertDir, CertSyncError> {
        match destination {
            Destination::Files { dir } => Ok(AtomicCertDir::new(dir.clone())),
            other => Err(unsupported(other)),
        }
    }

    async fn publish(destination: &Destination, material: &CertMaterial) -> Result<(), CertSyncError> {
        let dir = Self::cert_dir(destination)?;
        let material = material.clone();
        blocking(move || dir.write(&material))
            .await
            .map_err(|e| CertSyncError::TargetWrite {
                destination: destination.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Runs filesystem work (including fsync) off the async worker threads.
async fn blocking<T, F>(work: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

#[async_trait]
impl TargetStore for FileTargetStore {
    async fn read(&self, destination: &Destination) -> Result<Option<CertMaterial>, CertSyncError> {
        let dir = Self::cert_dir(destination)?;
        blocking(move || dir.read())
            .await
            .map_err(|e| CertSyncError::TargetRead {
                destination: destination.to_string(),
                message: e.to_string(),
            })
    }

    async fn create(
        &self,
        destination: &Destination,
        material: &CertMaterial,
    ) -> Result<(), CertSyncError> {
        Self::publish(destination, material).await?;
        info!("Initialised {}", destination);
        Ok(())
    }

    async fn patch(
        &self,
        destination: &Destination,
        material: &CertMaterial,
    ) -> Result<(), CertSyncError> {
        Self::publish(destination, material).await?;
        info!("Updated {}", destination);
        Ok(())
    }
}
