use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};

use spool_api::config::{ConfigParam, ConfigValues, ParamType, ParamValue};
use spool_api::ffi::{
    AbiVersionFn, CREATE_STORAGE_FACTORY_SYMBOL, ConfigParamsFn, CreatePluginFn,
    DESTROY_STORAGE_FACTORY_SYMBOL, DestroyPluginFn, PluginCreateResult, QS_ABI_VERSION,
};
use spool_api::storage::StorageFactory;

use crate::error::EngineError;

/// A loaded backend `.so` with its ABI version already verified.
pub struct PluginLib {
    _lib: Library,
    config_params_fn: ConfigParamsFn,
    create_fn: CreatePluginFn,
    destroy_fn: DestroyPluginFn,
}

impl PluginLib {
    /// Load `path`, check `qs_abi_version`, resolve the create/destroy symbols.
    pub fn load(
        path: &Path,
        create_symbol: &[u8],
        destroy_symbol: &[u8],
    ) -> Result<Self, EngineError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            EngineError::Config(format!("failed to load plugin '{}': {e}", path.display()))
        })?;

        let abi_fn: Symbol<AbiVersionFn> = unsafe { lib.get(b"qs_abi_version") }.map_err(|e| {
            EngineError::Config(format!(
                "plugin '{}' missing qs_abi_version symbol: {e}",
                path.display()
            ))
        })?;

        let plugin_abi = unsafe { abi_fn() };
        if plugin_abi != QS_ABI_VERSION {
            return Err(EngineError::Config(format!(
                "plugin '{}' ABI version mismatch: plugin={plugin_abi}, host={QS_ABI_VERSION}",
                path.display()
            )));
        }

        let symbol_error = |what: &str, e: libloading::Error| {
            EngineError::Config(format!("plugin '{}' missing {what} symbol: {e}", path.display()))
        };

        let config_params_fn: ConfigParamsFn =
            *unsafe { lib.get::<ConfigParamsFn>(b"qs_config_params") }
                .map_err(|e| symbol_error("qs_config_params", e))?;
        let create_fn: CreatePluginFn = *unsafe { lib.get::<CreatePluginFn>(create_symbol) }
            .map_err(|e| symbol_error("create", e))?;
        let destroy_fn: DestroyPluginFn = *unsafe { lib.get::<DestroyPluginFn>(destroy_symbol) }
            .map_err(|e| symbol_error("destroy", e))?;

        Ok(Self {
            _lib: lib,
            config_params_fn,
            create_fn,
            destroy_fn,
        })
    }

    /// Parameters the plugin declares via `qs_config_params`.
    pub fn config_params(&self) -> Vec<ConfigParam> {
        let ptr = unsafe { (self.config_params_fn)() };
        if ptr.is_null() {
            return Vec::new();
        }
        unsafe { *Box::from_raw(ptr as *mut Vec<ConfigParam>) }
    }

    /// Call the plugin's create function with validated values.
    pub fn create(&self, config: &ConfigValues) -> Result<*mut (), EngineError> {
        let result: PluginCreateResult =
            unsafe { (self.create_fn)(config as *const ConfigValues as *const ()) };

        if result.plugin_ptr.is_null() {
            let msg = if !result.error_ptr.is_null() && result.error_len > 0 {
                let error_msg = unsafe {
                    String::from_utf8_lossy(std::slice::from_raw_parts(
                        result.error_ptr,
                        result.error_len,
                    ))
                    .into_owned()
                };
                // The plugin allocated the message; the host frees it.
                unsafe {
                    let _ = Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                        result.error_ptr,
                        result.error_len,
                    ));
                };
                error_msg
            } else {
                "unknown error".to_string()
            };
            return Err(EngineError::Config(format!("plugin create failed: {msg}")));
        }

        Ok(result.plugin_ptr)
    }

    pub fn destroy_fn(&self) -> DestroyPluginFn {
        self.destroy_fn
    }
}

/// Parse a backend's `config` table into typed values.
///
/// Keys not declared in `params` are rejected. Only keys present in `config`
/// are returned; defaults and required checks happen in `validate_and_build`.
pub fn parse_plugin_config(
    config: Option<&serde_json::Value>,
    params: &[ConfigParam],
) -> Result<HashMap<String, ParamValue>, EngineError> {
    let obj = match config {
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => {
            return Err(EngineError::Config(
                "plugin config must be a table/object".into(),
            ));
        }
        None => return Ok(HashMap::new()),
    };

    let known: HashSet<&str> = params.iter().map(|p| p.name.as_str()).collect();
    if let Some(key) = obj.keys().find(|key| !known.contains(key.as_str())) {
        return Err(EngineError::Config(format!("unknown parameter '{key}'")));
    }

    let mut result = HashMap::new();
    for param in params {
        if let Some(v) = obj.get(&param.name) {
            result.insert(param.name.clone(), value_to_param_value(v, param)?);
        }
    }
    Ok(result)
}

/// Fill in defaults and enforce required parameters.
pub fn validate_and_build(
    parsed: &HashMap<String, ParamValue>,
    params: &[ConfigParam],
) -> Result<ConfigValues, EngineError> {
    let mut values = ConfigValues::new();

    for param in params {
        match parsed.get(&param.name) {
            Some(v) => values.set(&param.name, v.clone()),
            None => {
                if let Some(ref default) = param.default {
                    values.set(&param.name, default.clone());
                } else if param.required {
                    return Err(EngineError::Config(format!(
                        "missing required parameter '{}'",
                        param.name
                    )));
                }
            }
        }
    }

    Ok(values)
}

/// `parse_plugin_config` followed by `validate_and_build`.
///
/// Built-in backends use this too, so a config table means the same thing
/// whether the backend is linked in or loaded from a `.so`.
pub fn build_config(
    config: Option<&serde_json::Value>,
    params: &[ConfigParam],
) -> Result<ConfigValues, EngineError> {
    let raw = parse_plugin_config(config, params)?;
    validate_and_build(&raw, params)
}

fn value_to_param_value(
    val: &serde_json::Value,
    param: &ConfigParam,
) -> Result<ParamValue, EngineError> {
    let expected = |what: &str| EngineError::Config(format!("parameter '{}': expected {what}", param.name));

    match param.param_type {
        ParamType::Bool => val.as_bool().map(ParamValue::Bool).ok_or_else(|| expected("bool")),
        ParamType::I64 => val.as_i64().map(ParamValue::I64).ok_or_else(|| expected("integer")),
        ParamType::U64 => {
            if let Some(u) = val.as_u64() {
                return Ok(ParamValue::U64(u));
            }
            let i = val.as_i64().ok_or_else(|| expected("integer"))?;
            Err(EngineError::Config(format!(
                "parameter '{}': expected non-negative integer, got {i}",
                param.name
            )))
        }
        ParamType::Str => match val {
            serde_json::Value::String(s) => Ok(ParamValue::Str(s.clone())),
            serde_json::Value::Number(n) => Ok(ParamValue::Str(n.to_string())),
            serde_json::Value::Bool(b) => Ok(ParamValue::Str(b.to_string())),
            _ => Err(expected("string")),
        },
    }
}

/// Load a `StorageFactory` from a backend plugin `.so`.
///
/// 1. Load, verify ABI version.
/// 2. Ask for declared params, build `ConfigValues` from `config`.
/// 3. Call `qs_create_storage_factory(&config_values)`.
pub fn load_storage_factory(
    path: &Path,
    config: Option<&serde_json::Value>,
) -> Result<Arc<dyn StorageFactory>, EngineError> {
    let lib = PluginLib::load(
        path,
        CREATE_STORAGE_FACTORY_SYMBOL,
        DESTROY_STORAGE_FACTORY_SYMBOL,
    )?;
    let params = lib.config_params();
    let config_values = build_config(config, &params)?;
    let ptr = lib.create(&config_values)?;
    // Safety: the plugin returned a Box<Box<dyn StorageFactory>>.
    let factory = unsafe { *Box::from_raw(ptr as *mut Box<dyn StorageFactory>) };
    // The factory's vtable lives in the library; keep it mapped for the process lifetime.
    std::mem::forget(lib);
    tracing::info!(plugin = %path.display(), backend = %factory.id(), "loaded storage plugin");
    Ok(Arc::from(factory))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params() -> Vec<ConfigParam> {
        vec![
            ConfigParam::optional("sync_on_write", ParamType::Bool, ParamValue::Bool(false), ""),
            ConfigParam::optional("max_records", ParamType::U64, ParamValue::U64(0), ""),
            ConfigParam {
                name: "root".into(),
                param_type: ParamType::Str,
                required: true,
                default: None,
                description: "base directory".into(),
            },
        ]
    }

    #[test]
    fn defaults_fill_missing_values() {
        let values = build_config(Some(&json!({ "root": "/tmp/bags" })), &params()).unwrap();
        assert_eq!(values.get_bool("sync_on_write"), Some(false));
        assert_eq!(values.get_u64("max_records"), Some(0));
        assert_eq!(values.get_str("root"), Some("/tmp/bags"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = build_config(Some(&json!({ "root": "/x", "rooot": 1 })), &params()).unwrap_err();
        assert!(err.to_string().contains("unknown parameter 'rooot'"));
    }

    #[test]
    fn missing_required_is_rejected() {
        let err = build_config(None, &params()).unwrap_err();
        assert!(err.to_string().contains("missing required parameter 'root'"));
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let err = build_config(Some(&json!({ "root": "/x", "max_records": -1 })), &params())
            .unwrap_err();
        assert!(err.to_string().contains("non-negative"));

        let err = build_config(Some(&json!({ "root": "/x", "sync_on_write": "yes" })), &params())
            .unwrap_err();
        assert!(err.to_string().contains("expected bool"));

        let err = build_config(Some(&json!(["root"])), &params()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn missing_library_is_config_error() {
        let err = load_storage_factory(Path::new("/nonexistent/libspool_nope.so"), None)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
