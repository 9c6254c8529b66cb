use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to initialize database: {0}")]
    ConnectionError(String),

    #[error("Query execution error: {0}")]
    QueryError(String),

    #[error("Credentials error: {0}")]
    CredentialsError(String),

    #[error("{file}: {reason}")]
    LoadError { file: String, reason: String },

    #[error("Failed to load scripts: {0}")]
    ScriptsDirError(String),

    #[error("No valid modules found in {0}. Make sure your scripts declare functions")]
    NoModules(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Function not found: {function} in {file}")]
    FunctionNotFound { function: String, file: String },

    #[error("Error executing function: {0}")]
    InvocationError(String),

    #[error("Prompt error: {0}")]
    PromptError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ScriptError {
    pub fn load(file: impl Into<String>, reason: impl Into<String>) -> Self {
        ScriptError::LoadError {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
