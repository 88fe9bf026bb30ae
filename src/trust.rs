//! Trust-on-first-use store for repository automation files.
//!
//! A file is trusted when the SHA-256 of its current bytes equals the digest
//! recorded for its absolute path. Any edit changes the digest and the file
//! becomes untrusted again until re-approved.
//!
//! The database is a flat JSON object of `absolute path -> hex digest`:
//!
//! ```json
//! {
//!   "/home/me/src/app/.treeline.toml": "9f86d08188..."
//! }
//! ```
//!
//! Writes take an exclusive lock on `trusted.json.lock`, reload the file, apply
//! the change and save, so concurrent sessions don't drop each other's entries.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use etcetera::base_strategy::{BaseStrategy, choose_base_strategy};
use fs2::FileExt;
use sha2::{Digest, Sha256};

/// Read buffer for hashing.
const HASH_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TrustStatus {
    /// Digest recorded and matching.
    Trusted,
    /// Never trusted, edited since, or unreadable.
    Untrusted,
    NotFound,
}

#[derive(Debug)]
pub enum TrustError {
    FileNotFound { path: PathBuf },
    Hash { path: PathBuf, source: io::Error },
    Persist { path: PathBuf, source: io::Error },
    NoDataDir,
}

impl std::fmt::Display for TrustError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustError::FileNotFound { path } => {
                write!(f, "File does not exist: {}", path.display())
            }
            TrustError::Hash { path, source } => {
                write!(f, "Failed to hash {}: {source}", path.display())
            }
            TrustError::Persist { path, source } => {
                write!(f, "Failed to save trust database {}: {source}", path.display())
            }
            TrustError::NoDataDir => write!(
                f,
                "Cannot determine data directory. Set $HOME or $XDG_DATA_HOME"
            ),
        }
    }
}

impl std::error::Error for TrustError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrustError::Hash { source, .. } | TrustError::Persist { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Persistent map of trusted file digests.
#[derive(Debug, Clone)]
pub struct TrustStore {
    db_path: PathBuf,
    entries: BTreeMap<String, String>,
}

/// `<data_dir>/treeline/trusted.json`.
pub fn default_db_path() -> Result<PathBuf, TrustError> {
    let strategy = choose_base_strategy().map_err(|_| TrustError::NoDataDir)?;
    Ok(strategy.data_dir().join("treeline").join("trusted.json"))
}

impl TrustStore {
    /// Load the database at `db_path`.
    ///
    /// A missing file is an empty store. A corrupt file is also treated as
    /// empty, so nothing is trusted until re-approved.
    pub fn load(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let entries = read_entries(&db_path);
        Self { db_path, entries }
    }

    /// Load from [`default_db_path`].
    pub fn open_default() -> Result<Self, TrustError> {
        Ok(Self::load(default_db_path()?))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compare the file's current digest against the recorded one.
    pub fn check_trust(&self, file: &Path) -> TrustStatus {
        let Some(path) = absolute(file) else {
            return TrustStatus::NotFound;
        };
        if !path.exists() {
            return TrustStatus::NotFound;
        }
        let current = match hash_file(&path) {
            Ok(digest) => digest,
            Err(e) => {
                log::debug!("Cannot hash {}: {e}", path.display());
                return TrustStatus::Untrusted;
            }
        };
        match self.entries.get(&key(&path)) {
            Some(stored) if *stored == current => TrustStatus::Trusted,
            _ => TrustStatus::Untrusted,
        }
    }

    /// Whether `digest` is the one recorded for `file`.
    ///
    /// Lets a caller that already read the file check trust for exactly the
    /// bytes it holds.
    pub fn is_trusted_digest(&self, file: &Path, digest: &str) -> bool {
        absolute(file)
            .and_then(|path| self.entries.get(&key(&path)))
            .is_some_and(|stored| stored == digest)
    }

    /// Record the file's current digest and persist the database.
    pub fn trust_file(&mut self, file: &Path) -> Result<(), TrustError> {
        let path = existing_path(file)?;
        let digest = hash_file(&path).map_err(|source| TrustError::Hash {
            path: path.clone(),
            source,
        })?;
        self.record(&path, digest)
    }

    /// Record `digest` for `file` without re-reading it.
    ///
    /// Used when the user approved a preview: the digest of the bytes they
    /// saw is what gets trusted, whatever the file holds by now.
    pub fn trust_digest(&mut self, file: &Path, digest: &str) -> Result<(), TrustError> {
        let path = existing_path(file)?;
        self.record(&path, digest.to_string())
    }

    fn record(&mut self, path: &Path, digest: String) -> Result<(), TrustError> {
        let _lock = self.acquire_lock()?;
        // Pick up entries written by other sessions since we loaded
        self.entries = read_entries(&self.db_path);
        self.entries.insert(key(path), digest);
        self.save()?;
        log::debug!("Trusted {}", path.display());
        Ok(())
    }

    fn acquire_lock(&self) -> Result<File, TrustError> {
        let lock_path = self.db_path.with_extension("json.lock");
        let persist_err = |source| TrustError::Persist {
            path: self.db_path.clone(),
            source,
        };
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(persist_err)?;
        file.lock_exclusive().map_err(persist_err)?;
        Ok(file)
    }

    fn save(&self) -> Result<(), TrustError> {
        let persist_err = |source| TrustError::Persist {
            path: self.db_path.clone(),
            source,
        };
        let dir = self
            .db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).map_err(persist_err)?;

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| persist_err(io::Error::other(e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(persist_err)?;
        io::Write::write_all(&mut tmp, json.as_bytes()).map_err(persist_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
                .map_err(persist_err)?;
        }
        tmp.persist(&self.db_path)
            .map_err(|e| persist_err(e.error))?;
        Ok(())
    }
}

fn read_entries(db_path: &Path) -> BTreeMap<String, String> {
    let contents = match fs::read_to_string(db_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            log::warn!("Cannot read trust database {}: {e}", db_path.display());
            return BTreeMap::new();
        }
    };
    serde_json::from_str(&contents).unwrap_or_else(|e| {
        log::warn!(
            "Ignoring corrupt trust database {}: {e}",
            db_path.display()
        );
        BTreeMap::new()
    })
}

fn absolute(path: &Path) -> Option<PathBuf> {
    std::path::absolute(path).ok()
}

fn existing_path(file: &Path) -> Result<PathBuf, TrustError> {
    match absolute(file) {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(TrustError::FileNotFound { path }),
        None => Err(TrustError::FileNotFound {
            path: file.to_path_buf(),
        }),
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Hex SHA-256 of `bytes`; equal to [`hash_file`] of a file holding them.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of the file, read in fixed-size chunks.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
