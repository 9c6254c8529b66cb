use crate::loader::Modules;

/// One invocable function as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    /// `file:function`, accepted by `--execute`.
    pub qualified_name: String,
    pub display_name: String,
    pub file_name: String,
    pub function_name: String,
    pub parameters: Vec<String>,
}

impl FunctionDescriptor {
    /// File name without its `.cql` extension.
    pub fn file_stem(&self) -> &str {
        self.file_name
            .strip_suffix(".cql")
            .unwrap_or(&self.file_name)
    }

    pub fn params_label(&self) -> String {
        format!("({})", self.parameters.join(", "))
    }
}

/// Flatten every loaded module into catalog entries, file order first.
pub fn build_catalog(modules: &Modules) -> Vec<FunctionDescriptor> {
    modules
        .iter()
        .flat_map(|module| {
            module.functions.iter().map(move |function| {
                let qualified_name = format!("{}:{}", module.file_name, function.name);
                let parameters = function.parameter_names();
                FunctionDescriptor {
                    display_name: format!("{}({})", qualified_name, parameters.join(", ")),
                    qualified_name,
                    file_name: module.file_name.clone(),
                    function_name: function.name.clone(),
                    parameters,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn catalog_lists_every_function_with_parameters() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("users.cql"),
            "-- fn count_users()\n\
             SELECT count(*) FROM users;\n\
             -- fn users_by_age(min_age, max_age = 100)\n\
             SELECT * FROM users WHERE age >= :min_age AND age <= :max_age ALLOW FILTERING;\n",
        )
        .unwrap();
        fs::write(dir.path().join("audit.cql"), "-- fn recent({since, limit = 10})\nSELECT * FROM audit WHERE ts > :since LIMIT :limit;\n").unwrap();

        let catalog = build_catalog(&Modules::load(dir.path()).unwrap());

        let names: Vec<_> = catalog.iter().map(|f| f.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["audit.cql:recent", "users.cql:count_users", "users.cql:users_by_age"]);

        assert!(catalog[1].parameters.is_empty());
        assert_eq!(catalog[1].display_name, "users.cql:count_users()");
        assert_eq!(catalog[2].parameters, vec!["min_age", "max_age"]);
        assert_eq!(catalog[2].display_name, "users.cql:users_by_age(min_age, max_age)");
        assert_eq!(catalog[0].parameters, vec!["{since, limit = 10}"]);
        assert_eq!(catalog[2].file_stem(), "users");
    }

    #[test]
    fn bundled_sample_scripts_load() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("cql-scripts");
        let modules = Modules::load(&dir).unwrap();
        assert_eq!(modules.len(), 2);

        let catalog = build_catalog(&modules);
        let find = |name: &str| catalog.iter().find(|f| f.qualified_name == name).unwrap();
        assert_eq!(catalog.len(), 9);
        assert!(find("users.cql:list_users").parameters.is_empty());
        assert_eq!(find("users.cql:users_by_age").parameters, vec!["min_age", "max_age"]);
        assert_eq!(find("users.cql:active-users").display_name, "users.cql:active-users()");
        assert_eq!(
            find("company_groups.cql:add_company_group").parameters,
            vec!["name", "tax_id", "plan", "modules"]
        );
    }
}
