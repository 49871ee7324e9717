//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`SettingsPort`] for the expansion service.
//!
//! Blob layout: one version byte followed by the postcard-encoded
//! [`ExpansionSettings`].  A blob with an unknown version or one that fails
//! to decode reads back as [`SettingsError::Corrupted`], which makes the
//! boot sequence rewrite defaults.
//!
//! - ESP-IDF: namespace `expansion`, key `settings`; commits are atomic
//!   per `nvs_commit()`.
//! - Host: in-memory map (simulation and tests).

use log::{info, warn};

use crate::app::ports::SettingsPort;
use crate::config::ExpansionSettings;
use crate::error::SettingsError;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Bumped whenever the settings struct changes shape.
pub const SETTINGS_VERSION: u8 = 1;

const NAMESPACE: &str = "expansion";
const SETTINGS_KEY: &str = "settings";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 64;

/// Serialize settings behind the version tag.
pub fn encode_settings(settings: &ExpansionSettings) -> Result<Vec<u8>, SettingsError> {
    let mut out = vec![SETTINGS_VERSION];
    let body = postcard::to_allocvec(settings).map_err(|_| SettingsError::IoError)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse a stored blob, rejecting unknown versions.
pub fn decode_settings(blob: &[u8]) -> Result<ExpansionSettings, SettingsError> {
    match blob.split_first() {
        Some((&SETTINGS_VERSION, body)) => {
            postcard::from_bytes(body).map_err(|_| SettingsError::Corrupted)
        }
        Some((version, _)) => {
            warn!("NvsAdapter: unknown settings version {}", version);
            Err(SettingsError::Corrupted)
        }
        None => Err(SettingsError::Corrupted),
    }
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On a full partition or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, SettingsError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(SettingsError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(SettingsError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(SettingsError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Overwrite the stored blob with raw bytes (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn write_raw(&mut self, blob: &[u8]) {
        self.store
            .insert(Self::composite_key(NAMESPACE, SETTINGS_KEY), blob.to_vec());
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: `ns_buf` is null-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns_buf.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        // SAFETY: `handle` was opened above and is not used afterwards.
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

impl SettingsPort for NvsAdapter {
    fn load(&self) -> Result<ExpansionSettings, SettingsError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(NAMESPACE, SETTINGS_KEY);
            match self.store.get(&key) {
                Some(blob) => {
                    let settings = decode_settings(blob)?;
                    info!("NvsAdapter: loaded settings from store");
                    Ok(settings)
                }
                None => Err(SettingsError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(NAMESPACE, false, |handle| {
                let key_cstr = b"settings\0";
                let mut buf = [0u8; MAX_BLOB_SIZE];
                let mut size = buf.len();
                // SAFETY: `buf` is writable for `size` bytes and the key is
                // null-terminated.
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr().cast(),
                        buf.as_mut_ptr().cast(),
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf[..size].to_vec())
            });

            match result {
                Ok(blob) => {
                    let settings = decode_settings(&blob)?;
                    info!("NvsAdapter: loaded settings from NVS ({} bytes)", blob.len());
                    Ok(settings)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(SettingsError::NotFound),
                Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(SettingsError::Corrupted),
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}", e);
                    Err(SettingsError::IoError)
                }
            }
        }
    }

    fn save(&mut self, settings: &ExpansionSettings) -> Result<(), SettingsError> {
        let blob = encode_settings(settings)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(NAMESPACE, SETTINGS_KEY);
            self.store.insert(key, blob);
            info!("NvsAdapter: settings saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(NAMESPACE, true, |handle| {
                let key_cstr = b"settings\0";
                // SAFETY: `blob` is readable for its full length and the key
                // is null-terminated.
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_cstr.as_ptr().cast(),
                        blob.as_ptr().cast(),
                        blob.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                // SAFETY: `handle` is open read-write.
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: settings saved to NVS ({} bytes)", blob.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(SettingsError::IoError)
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
