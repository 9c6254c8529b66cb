use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing::debug;

use crate::catalog::build_catalog;
use crate::config::{config_locations, sample_config, Settings};
use crate::connection::{ConnectionConfig, ConnectionManager};
use crate::error::ScriptError;
use crate::executor::FunctionExecutor;
use crate::formatter::{render, OutputFormat};
use crate::interactive::{select_function, TerminalPrompter};
use crate::loader::Modules;
use crate::value::coerce_all;

#[derive(Parser, Debug)]
#[command(name = "cqlrun")]
#[command(author = "Florian")]
#[command(version = "0.1.0")]
#[command(about = "Discover, select and run named CQL script functions", long_about = None)]
pub struct Cli {
    /// Path to the scripts directory (overrides config)
    #[arg(short = 's', long = "load-script", value_name = "PATH")]
    pub load_script: Option<PathBuf>,

    /// Path to the credentials file (overrides config)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List available functions
    #[arg(short, long)]
    pub list: bool,

    /// Execute a specific function (`file:function` or a bare function name)
    #[arg(short, long, value_name = "FUNCTION")]
    pub execute: Option<String>,

    /// Arguments to pass to the function
    #[arg(short, long, num_args = 1.., allow_negative_numbers = true, requires = "execute")]
    pub args: Vec<String>,

    /// Display results in table format (default: JSON)
    #[arg(short, long)]
    pub table: bool,

    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a sample configuration file
    InitConfig,
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        if let Some(Commands::InitConfig) = &self.command {
            self.print_sample_config();
            return Ok(());
        }

        let settings = Settings::load();
        let scripts_directory = self.load_script.clone().unwrap_or_else(|| settings.scripts_directory.clone());
        let credentials_path = self.config.clone().unwrap_or_else(|| settings.credentials_path.clone());
        debug!("Scripts directory: {}", scripts_directory.display());

        let modules = Modules::load(&scripts_directory)?;
        debug!("Loaded {} script module(s)", modules.len());

        if self.list {
            self.print_catalog(&modules);
            return Ok(());
        }

        let mut prompter = TerminalPrompter::new()?;

        let (name, args) = match &self.execute {
            Some(name) => (name.clone(), coerce_all(&self.args)),
            None => match select_function(&mut prompter, &build_catalog(&modules))? {
                Some(name) => (name, Vec::new()),
                None => return Ok(()),
            },
        };

        let connection = connect(&credentials_path).await?;

        println!("{}", format!("\n🚀 Executing: {}", name).yellow());
        let result = FunctionExecutor::new(&modules, &connection)
            .execute(&name, args, &mut prompter)
            .await?;

        let format = if self.table { OutputFormat::Table } else { OutputFormat::Json };
        println!("{}", render(&result, &name, format));

        Ok(())
    }

    fn print_sample_config(&self) {
        println!("{}", "📝 Sample configuration file (.cqlrun.json):".green());
        println!("{}", sample_config());
        println!("{}", "\n💡 You can place this file in:".yellow());
        let cwd = PathBuf::from(".");
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        for location in config_locations(&cwd, Some(&home)) {
            println!("  - {}", location.display());
        }
    }

    fn print_catalog(&self, modules: &Modules) {
        println!("{}", "\n📋 Available functions:".green());
        for (index, function) in build_catalog(modules).iter().enumerate() {
            println!("{}", format!("  {}. {}", index + 1, function.display_name).cyan());
        }
    }
}

async fn connect(credentials_path: &std::path::Path) -> Result<ConnectionManager, ScriptError> {
    let mut config = ConnectionConfig::from_credentials_file(credentials_path)
        .map_err(|e| ScriptError::ConnectionError(e.to_string()))?;
    config.prompt_password_if_missing()?;
    let connection = ConnectionManager::connect(config).await?;
    println!("{}", "✅ Database connection initialized".green());
    Ok(connection)
}
