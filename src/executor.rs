use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ScriptError, ScriptResult};
use crate::interactive::{prompt_for_arguments, Prompter};
use crate::loader::Modules;
use crate::script::{ScriptFunction, ScriptModule};
use crate::store::{ResultSet, Store};
use crate::value::Arg;

/// Runs script functions against a store.
pub struct FunctionExecutor<'a, S: Store> {
    modules: &'a Modules,
    store: &'a S,
}

impl<'a, S: Store> FunctionExecutor<'a, S> {
    pub fn new(modules: &'a Modules, store: &'a S) -> Self {
        Self { modules, store }
    }

    /// Resolve `name`, gather arguments, and invoke.
    ///
    /// Provided arguments are used positionally. A function that declares
    /// parameters and gets none is prompted for each of them.
    pub async fn execute<P: Prompter>(
        &self,
        name: &str,
        provided: Vec<Arg>,
        prompter: &mut P,
    ) -> ScriptResult<Value> {
        let (module, function) = self.modules.resolve(name)?;

        let args = if !function.params.is_empty() && provided.is_empty() {
            prompt_for_arguments(prompter, &function.parameter_names(), &function.name)?
        } else {
            if provided.len() > function.params.len() {
                warn!(
                    "{} takes {} argument(s), ignoring {} extra",
                    function.name,
                    function.params.len(),
                    provided.len() - function.params.len()
                );
            }
            provided
        };

        self.invoke(module, function, &args)
            .await
            .map_err(|e| ScriptError::InvocationError(e.to_string()))
    }

    async fn invoke(&self, module: &ScriptModule, function: &ScriptFunction, args: &[Arg]) -> ScriptResult<Value> {
        info!("Invoking {}:{}", module.file_name, function.name);

        if let Some(keyspace) = &module.keyspace {
            self.store.use_keyspace(keyspace).await?;
        }

        let bindings = function.bind(args);
        let mut last = None;
        for statement in &function.statements {
            let cql = statement.render(&bindings);
            last = Some(self.store.run(&cql).await?);
        }

        let statements = function.statements.len();
        Ok(match last {
            Some(ResultSet {
                columns,
                rows: Some(docs),
            }) => {
                let size = docs.len();
                json!({ "docs": docs, "size": size, "columns": columns })
            }
            _ => json!({ "status": "ok", "statements": statements }),
        })
    }
}
