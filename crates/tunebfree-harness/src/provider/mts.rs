//! MTS-ESP master binding.
//!
//! The MTS-ESP runtime ships as a shared library installed at a fixed,
//! platform-specific location. It is loaded at runtime so a host without it
//! reports `ProviderUnavailable` instead of failing to link.

use std::ffi::{c_char, c_void, CString};
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::error::{HarnessError, HarnessResult};
use crate::provider::TuningProvider;
use crate::table::FrequencyTable;

/// Environment variable overriding the library location.
pub const LIBMTS_ENV: &str = "TUNEBFREE_LIBMTS";

const PROVIDER_NAME: &str = "MTS-ESP";

/// Where the MTS-ESP installer puts the library on this platform.
pub fn default_library_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("C:\\Program Files\\Common Files\\MTS-ESP\\LIBMTS.dll")
    } else if cfg!(target_os = "macos") {
        PathBuf::from("/Library/Application Support/MTS-ESP/libMTS.dylib")
    } else {
        PathBuf::from("/usr/local/lib/libMTS.so")
    }
}

/// Library path after applying the environment override.
pub fn library_path() -> PathBuf {
    std::env::var_os(LIBMTS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_library_path)
}

type VoidFn = unsafe extern "C" fn();
type BoolFn = unsafe extern "C" fn() -> bool;
type RegisterFn = unsafe extern "C" fn(*mut c_void);
type SetTuningsFn = unsafe extern "C" fn(*const f64);
type SetNameFn = unsafe extern "C" fn(*const c_char);

/// Resolved master entry points. The function pointers stay valid while
/// `_lib` is alive.
struct MtsApi {
    register_master: RegisterFn,
    deregister_master: VoidFn,
    reinitialize: VoidFn,
    can_register_master: BoolFn,
    set_note_tunings: SetTuningsFn,
    set_scale_name: SetNameFn,
    _lib: Library,
}

impl MtsApi {
    fn load(path: &Path) -> Result<Self, String> {
        // SAFETY: loading the vendor library runs its initializers, which only
        // set up the shared-memory IPC block.
        let lib = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;

        unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, String> {
            lib.get::<T>(name).map(|s| *s).map_err(|e| {
                format!(
                    "missing symbol {}: {}",
                    String::from_utf8_lossy(&name[..name.len() - 1]),
                    e
                )
            })
        }

        // SAFETY: signatures match libMTSMaster.h.
        unsafe {
            Ok(Self {
                register_master: symbol(&lib, b"MTS_RegisterMaster\0")?,
                deregister_master: symbol(&lib, b"MTS_DeregisterMaster\0")?,
                reinitialize: symbol(&lib, b"MTS_Reinitialize\0")?,
                can_register_master: symbol(&lib, b"MTS_CanRegisterMaster\0")?,
                set_note_tunings: symbol(&lib, b"MTS_SetNoteTunings\0")?,
                set_scale_name: symbol(&lib, b"MTS_SetScaleName\0")?,
                _lib: lib,
            })
        }
    }
}

/// MTS-ESP master backed by the host-installed library.
pub struct MtsEspProvider {
    path: PathBuf,
    api: Option<MtsApi>,
    registered: bool,
}

impl MtsEspProvider {
    /// Provider using the platform default path (or `TUNEBFREE_LIBMTS`).
    pub fn new() -> Self {
        Self::with_library(library_path())
    }

    /// Provider using an explicit library path.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            api: None,
            registered: false,
        }
    }

    /// Library path this provider loads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn api(&mut self) -> HarnessResult<&MtsApi> {
        if self.api.is_none() {
            if !self.path.exists() {
                return Err(HarnessError::provider_unavailable(
                    PROVIDER_NAME,
                    format!("library not installed at {}", self.path.display()),
                ));
            }
            let api = MtsApi::load(&self.path).map_err(|e| {
                HarnessError::provider_unavailable(
                    PROVIDER_NAME,
                    format!("failed to load {}: {}", self.path.display(), e),
                )
            })?;
            log::debug!("Loaded MTS-ESP library from {}", self.path.display());
            self.api = Some(api);
        }
        self.api.as_ref().ok_or_else(|| {
            HarnessError::provider_unavailable(PROVIDER_NAME, "library not loaded")
        })
    }
}

impl Default for MtsEspProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningProvider for MtsEspProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn check_available(&mut self) -> HarnessResult<()> {
        self.api().map(|_| ())
    }

    fn reset(&mut self) -> HarnessResult<()> {
        let api = self.api()?;
        // SAFETY: no arguments; clears the master slot in shared memory.
        unsafe { (api.reinitialize)() };
        Ok(())
    }

    fn connect(&mut self) -> HarnessResult<()> {
        let api = self.api()?;
        // SAFETY: plain queries/updates of the shared master slot.
        let can_register = unsafe { (api.can_register_master)() };
        if !can_register {
            return Err(HarnessError::provider_rejected(
                PROVIDER_NAME,
                "another master is already registered",
            ));
        }
        unsafe { (api.register_master)(std::ptr::null_mut()) };
        self.registered = true;
        Ok(())
    }

    fn publish(&mut self, table: &FrequencyTable, label: &str) -> HarnessResult<()> {
        let name = CString::new(label.replace('\0', " "))
            .map_err(|e| HarnessError::provider_rejected(PROVIDER_NAME, e.to_string()))?;
        let api = self.api()?;
        // SAFETY: the library copies exactly 128 doubles from the pointer and
        // the NUL-terminated name; both outlive the calls.
        unsafe {
            (api.set_note_tunings)(table.as_array().as_ptr());
            (api.set_scale_name)(name.as_ptr());
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.registered {
            return;
        }
        if let Some(api) = self.api.as_ref() {
            // SAFETY: we are the registered master.
            unsafe { (api.deregister_master)() };
        }
        self.registered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_library_path_is_platform_specific() {
        let path = default_library_path();
        if cfg!(target_os = "linux") {
            assert_eq!(path, PathBuf::from("/usr/local/lib/libMTS.so"));
        }
        assert!(path.is_absolute() || cfg!(windows));
    }

    #[test]
    fn test_missing_library_is_unavailable() {
        let mut provider = MtsEspProvider::with_library("/definitely/not/here/libMTS.so");
        let err = provider.check_available().unwrap_err();
        assert!(matches!(err, HarnessError::ProviderUnavailable { .. }));
        assert!(err.is_precondition());
        assert!(err.to_string().contains("/definitely/not/here/libMTS.so"));

        let err = provider.connect().unwrap_err();
        assert!(matches!(err, HarnessError::ProviderUnavailable { .. }));

        // Never registered, so this is a no-op.
        provider.disconnect();
    }

    #[test]
    fn test_garbage_library_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("libMTS.so");
        std::fs::write(&path, b"not a shared object").unwrap();

        let mut provider = MtsEspProvider::with_library(&path);
        let err = provider.check_available().unwrap_err();
        assert!(err.to_string().contains("failed to load"));
    }
}
