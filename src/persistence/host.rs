//! File-backed credential store for host builds.
//!
//! Uses `~/.ble-wifi-provisioner/credentials.bin` by default. Saves go through
//! a temporary file renamed over the record, so a reader sees either the old
//! record or the new one.

use super::{decode_record, encode_record, CredentialStore, StoreError};
use crate::config::Credential;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

/// Get the default credential file path.
///
/// Returns `~/.ble-wifi-provisioner/credentials.bin`
pub fn default_credential_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".ble-wifi-provisioner")
        .join("credentials.bin"))
}

/// Credential store over a single file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at [`default_credential_path`].
    pub fn open_default() -> io::Result<Self> {
        Ok(Self::new(default_credential_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_verified(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        fs::write(&temp, bytes)?;
        fs::rename(&temp, &self.path)?;

        // Verify write by reading back
        let mut read_back = fs::read(&self.path)?;
        let matches = read_back == bytes;
        read_back.zeroize();
        if !matches {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "verification failed: data mismatch after save",
            ));
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_record(&self) -> Result<Option<Credential>, StoreError> {
        let mut bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No credential file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(StoreError::ReadCorrupt(e.to_string())),
        };
        let result = decode_record(&bytes).map(Some);
        bytes.zeroize();
        result
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        let mut bytes = encode_record(credential);
        let result = self
            .write_verified(&bytes)
            .map_err(|e| StoreError::WriteFailed(e.to_string()));
        bytes.zeroize();
        result?;
        info!("Credential saved to {:?}", self.path);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::WriteFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir()
            .join(format!("ble-provisioner-test-{}-{}", pid, id))
            .join("credentials.bin")
    }

    fn cleanup(store: &FileCredentialStore) {
        if let Some(dir) = store.path().parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_save_then_load() {
        let mut store = FileCredentialStore::new(unique_path());
        let credential = Credential::new("Home", "hunter22").unwrap();

        store.save(&credential).expect("save");
        assert_eq!(store.load(), Some(credential));

        cleanup(&store);
    }

    #[test]
    fn test_save_overwrites() {
        let mut store = FileCredentialStore::new(unique_path());
        store.save(&Credential::new("Old", "first-pass").unwrap()).unwrap();
        let newer = Credential::new("New", "second-pass").unwrap();
        store.save(&newer).unwrap();

        assert_eq!(store.load(), Some(newer));
        assert!(!store.temp_path().exists());

        cleanup(&store);
    }

    #[test]
    fn test_load_missing_is_none() {
        let store = FileCredentialStore::new(unique_path());
        assert_eq!(store.load_record(), Ok(None));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_load_corrupt_is_none() {
        let store = FileCredentialStore::new(unique_path());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"ssid=Home;pwd=hunter22").unwrap();

        assert!(matches!(store.load_record(), Err(StoreError::ReadCorrupt(_))));
        assert_eq!(store.load(), None);

        cleanup(&store);
    }

    #[test]
    fn test_clear() {
        let mut store = FileCredentialStore::new(unique_path());
        store.save(&Credential::new("Home", "hunter22").unwrap()).unwrap();

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        // Clearing again is fine.
        store.clear().unwrap();

        cleanup(&store);
    }

    #[test]
    fn test_default_path_layout() {
        if let Ok(path) = default_credential_path() {
            assert!(path.ends_with(".ble-wifi-provisioner/credentials.bin"));
        }
    }
}
