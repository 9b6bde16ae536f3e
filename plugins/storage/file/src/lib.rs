mod config;
mod storage;

pub use config::FileStorageConfig;
pub use storage::{BACKEND_ID, FileStorage, FileStorageFactory};

// ════════════════════════════════════════════════════════════════
//  Plugin FFI entry points
// ════════════════════════════════════════════════════════════════

#[cfg(feature = "plugin")]
mod ffi {
    use spool_api::ffi::{PluginCreateResult, config_from_ptr, plugin_err, plugin_ok};
    use spool_api::storage::StorageFactory;

    use super::{FileStorageConfig, FileStorageFactory};

    /// # Safety
    ///
    /// `config_ptr` must point to a valid `ConfigValues` owned by the engine.
    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn qs_create_storage_factory(config_ptr: *const ()) -> PluginCreateResult {
        let values = unsafe { config_from_ptr(config_ptr) };
        match FileStorageConfig::from_values(values) {
            Ok(config) => plugin_ok(Box::new(
                Box::new(FileStorageFactory::new(config)) as Box<dyn StorageFactory>
            )),
            Err(e) => plugin_err(&e.to_string()),
        }
    }

    spool_api::qs_destroy_fn!(qs_destroy_storage_factory, spool_api::storage::StorageFactory);
    spool_api::qs_config_params_fn!(FileStorageConfig::params());
    spool_api::qs_abi_version_fn!();
}
