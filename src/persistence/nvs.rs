//! NVS-backed credential store.
//!
//! The record lives as one raw blob in namespace `wifi_config`, key
//! `credentials`. Development builds do not encrypt NVS, so the password is
//! readable by anyone with flash access.

use super::{decode_record, encode_record, CredentialStore, StoreError, MAX_RECORD_LEN};
use crate::config::Credential;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::{debug, info};
use zeroize::Zeroize;

/// NVS namespace for Wi-Fi configuration.
const NVS_NAMESPACE: &str = "wifi_config";

/// NVS key for the stored record.
const NVS_KEY: &str = "credentials";

/// Credential store over an NVS namespace.
pub struct NvsCredentialStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsCredentialStore {
    /// Open (creating if needed) the credential namespace.
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl CredentialStore for NvsCredentialStore {
    fn load_record(&self) -> Result<Option<Credential>, StoreError> {
        // One spare byte so an oversized blob reads as corrupt, not truncated.
        let mut buf = [0u8; MAX_RECORD_LEN + 1];
        let result = match self.nvs.get_raw(NVS_KEY, &mut buf) {
            Ok(Some(bytes)) => decode_record(bytes).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::ReadCorrupt(format!("{:?}", e))),
        };
        buf.zeroize();
        result
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        let mut bytes = encode_record(credential);
        let result = self.write_verified(&bytes);
        bytes.zeroize();
        if result.is_ok() {
            info!("Credential for '{}' saved and verified in NVS", credential.ssid());
        }
        result
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        let removed = self
            .nvs
            .remove(NVS_KEY)
            .map_err(|e| StoreError::WriteFailed(format!("{:?}", e)))?;
        debug!("Cleared NVS credential (existed: {})", removed);
        Ok(())
    }
}

impl NvsCredentialStore {
    /// Write the blob and read it back to catch silent flash failures.
    fn write_verified(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.nvs
            .set_raw(NVS_KEY, bytes)
            .map_err(|e| StoreError::WriteFailed(format!("{:?}", e)))?;

        let mut verify = [0u8; MAX_RECORD_LEN + 1];
        let matches = match self.nvs.get_raw(NVS_KEY, &mut verify) {
            Ok(Some(read)) => read == bytes,
            Ok(None) => false,
            Err(e) => {
                return Err(StoreError::WriteFailed(format!(
                    "read back after save: {:?}",
                    e
                )))
            }
        };
        verify.zeroize();

        if !matches {
            return Err(StoreError::WriteFailed(
                "verification failed: data mismatch after save".into(),
            ));
        }
        Ok(())
    }
}
