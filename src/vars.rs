//! Variable space: the process environment merged with the YAML variables
//! file, file keys winning.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::Error;

/// Mutable during prehooks, frozen from template rendering onward.
pub type VariableSpace = BTreeMap<String, serde_yaml::Value>;

/// Load the variable space from `path`.
///
/// A missing file is fatal only when the path was explicitly overridden on
/// the command line; the default location is allowed to be absent, in which
/// case only the environment is used.
pub fn load(path: &Path, explicit: bool) -> Result<VariableSpace, Error> {
    let mut vars: VariableSpace = std::env::vars()
        .map(|(key, value)| (key, serde_yaml::Value::String(value)))
        .collect();

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if explicit {
                return Err(Error::VariablesMissing(path.to_path_buf()));
            }
            debug!(path = %path.display(), "no variables file, using environment only");
            return Ok(vars);
        }
        Err(e) => {
            return Err(Error::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let doc: serde_yaml::Value = serde_yaml::from_str(&raw).map_err(|e| Error::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    match doc {
        serde_yaml::Value::Mapping(mapping) => {
            for (key, value) in mapping {
                let serde_yaml::Value::String(key) = key else {
                    return Err(Error::ParseError {
                        path: path.to_path_buf(),
                        reason: "top-level keys must be strings".to_string(),
                    });
                };
                vars.insert(key, value);
            }
        }
        // An empty file parses as null; nothing to merge.
        serde_yaml::Value::Null => {}
        _ => {
            return Err(Error::ParseError {
                path: path.to_path_buf(),
                reason: "expected a mapping at the top level".to_string(),
            });
        }
    }

    debug!(path = %path.display(), keys = vars.len(), "variables loaded");
    Ok(vars)
}
