use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ScriptError, ScriptResult};
use crate::script::{parse_module, ScriptFunction, ScriptModule};

pub const SCRIPT_EXTENSION: &str = "cql";

/// Every module that loaded, keyed and ordered by file name.
#[derive(Debug, Clone, Default)]
pub struct Modules {
    modules: BTreeMap<String, ScriptModule>,
}

impl Modules {
    /// Load every `.cql` file in `dir`. A file that fails to parse is
    /// logged and skipped; an empty result is an error.
    pub fn load(dir: &Path) -> ScriptResult<Self> {
        let entries = fs::read_dir(dir)
            .map_err(|e| ScriptError::ScriptsDirError(format!("{}: {}", dir.display(), e)))?;

        let mut modules = BTreeMap::new();

        for entry in entries {
            let path = entry
                .map_err(|e| ScriptError::ScriptsDirError(format!("{}: {}", dir.display(), e)))?
                .path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != SCRIPT_EXTENSION) {
                continue;
            }
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    warn!("Skipping {}: file name is not valid UTF-8", path.display());
                    continue;
                }
            };

            let loaded = fs::read_to_string(&path)
                .map_err(|e| ScriptError::load(&file_name, e.to_string()))
                .and_then(|source| parse_module(&file_name, &path, &source));

            match loaded {
                Ok(module) => {
                    debug!("Loaded {} ({} functions)", module.path.display(), module.functions.len());
                    modules.insert(file_name, module);
                }
                Err(e) => warn!("Could not load {}", e),
            }
        }

        let modules = Self { modules };
        if modules.is_empty() {
            return Err(ScriptError::NoModules(dir.display().to_string()));
        }

        Ok(modules)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptModule> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Find a module by exact file name or by file stem.
    pub fn module(&self, file: &str) -> Option<&ScriptModule> {
        self.modules
            .get(file)
            .or_else(|| self.modules.values().find(|m| m.stem() == file))
    }

    /// Resolve `file:function` or a bare function name (first file wins).
    pub fn resolve(&self, name: &str) -> ScriptResult<(&ScriptModule, &ScriptFunction)> {
        match name.split_once(':') {
            Some((file, function)) => {
                let module = self
                    .module(file)
                    .ok_or_else(|| ScriptError::FileNotFound(file.to_string()))?;
                let found = module.function(function).ok_or_else(|| ScriptError::FunctionNotFound {
                    function: function.to_string(),
                    file: module.file_name.clone(),
                })?;
                Ok((module, found))
            }
            None => self
                .modules
                .values()
                .find_map(|m| m.function(name).map(|f| (m, f)))
                .ok_or_else(|| ScriptError::FunctionNotFound {
                    function: name.to_string(),
                    file: "any loaded script".to_string(),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn loads_valid_files_and_skips_broken_ones() {
        let dir = TempDir::new().unwrap();
        write(&dir, "users.cql", "-- fn list_users()\nSELECT * FROM users;\n");
        write(&dir, "broken.cql", "SELECT 1 FROM t;\n");
        write(&dir, "notes.txt", "-- fn ignored()\nSELECT 1 FROM t;\n");

        let modules = Modules::load(dir.path()).unwrap();

        assert_eq!(modules.len(), 1);
        assert!(modules.module("users.cql").is_some());
        assert!(modules.module("broken.cql").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn skips_non_utf8_file_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        write(&dir, "users.cql", "-- fn list_users()\nSELECT * FROM users;\n");
        let odd = dir.path().join(OsStr::from_bytes(b"bad\xff.cql"));
        if fs::write(&odd, "-- fn f()\nSELECT 1 FROM t;\n").is_err() {
            // Some filesystems refuse non-UTF-8 names outright.
            return;
        }

        let modules = Modules::load(dir.path()).unwrap();

        assert_eq!(modules.len(), 1);
        assert!(!modules.is_empty());
        assert!(modules.module("users").is_some());
    }

    #[test]
    fn fails_when_nothing_loads() {
        let dir = TempDir::new().unwrap();
        write(&dir, "broken.cql", "-- fn f()\n");

        let err = Modules::load(dir.path()).unwrap_err();
        assert!(matches!(err, ScriptError::NoModules(_)));
    }

    #[test]
    fn fails_on_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = Modules::load(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().starts_with("Failed to load scripts"));
    }

    #[test]
    fn resolves_qualified_and_bare_names() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.cql", "-- fn shared()\nSELECT 1 FROM t;\n");
        write(&dir, "b.cql", "-- fn shared()\nSELECT 2 FROM t;\n-- fn only_b()\nSELECT 3 FROM t;\n");
        let modules = Modules::load(dir.path()).unwrap();

        let (module, _) = modules.resolve("shared").unwrap();
        assert_eq!(module.file_name, "a.cql");

        let (module, function) = modules.resolve("b:shared").unwrap();
        assert_eq!(module.file_name, "b.cql");
        assert_eq!(function.name, "shared");

        let (module, _) = modules.resolve("b.cql:only_b").unwrap();
        assert_eq!(module.file_name, "b.cql");

        assert!(matches!(modules.resolve("c:shared"), Err(ScriptError::FileNotFound(_))));
        assert!(matches!(
            modules.resolve("a:only_b"),
            Err(ScriptError::FunctionNotFound { .. })
        ));
        assert!(matches!(modules.resolve("missing"), Err(ScriptError::FunctionNotFound { .. })));
    }
}
