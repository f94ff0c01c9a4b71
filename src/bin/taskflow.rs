use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use taskflow::compiler::loader::load_definition_from_yaml;
use taskflow::config::EngineConfig;
use taskflow::executor::memory::InMemoryExecutorDirectory;
use taskflow::runtime::engine::{Engine, EngineServices};
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a process definition in memory, completing tasks as scripted
    Run {
        /// Path to the process YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// Initial variables (key=value)
        #[arg(long, short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, serde_json::Value)>,

        /// Actors known to the directory
        #[arg(long = "actor")]
        actors: Vec<String>,

        /// Groups known to the directory (name=actor1,actor2)
        #[arg(long = "group", value_parser = parse_group)]
        groups: Vec<(String, Vec<String>)>,

        /// Engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Actors completing one of their tasks, in order
        #[arg(long = "complete")]
        completions: Vec<String>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let pos = s.find('=').ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    let key = s[..pos].to_string();
    let val_str = &s[pos + 1..];
    // Try parsing as JSON, otherwise treat as string
    let val = serde_json::from_str(val_str).unwrap_or_else(|_| serde_json::Value::String(val_str.to_string()));
    Ok((key, val))
}

fn parse_group(s: &str) -> Result<(String, Vec<String>), String> {
    let (name, members) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid NAME=a,b: no `=` found in `{}`", s))?;
    let members = members
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name.to_string(), members))
}

async fn print_tasks(engine: &Engine, process_id: Uuid) -> Result<()> {
    let tasks = engine.open_tasks(process_id).await?;
    println!("Open tasks: {}", tasks.len());
    for task in tasks {
        println!("  [{}] {} -> {} ({})", task.index, task.name, task.executor, task.id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, vars, actors, groups, config, completions } => {
            let config = match config {
                Some(path) => EngineConfig::from_yaml_file(&path.to_string_lossy())?,
                None => EngineConfig::default(),
            };

            let directory = Arc::new(InMemoryExecutorDirectory::new());
            for name in &actors {
                directory.add_actor(name);
            }
            for (group, members) in &groups {
                let mut resolved = Vec::with_capacity(members.len());
                for member in members {
                    let actor = match directory.actor(member) {
                        Some(actor) => actor,
                        None => directory.add_actor(member),
                    };
                    resolved.push(actor);
                }
                let refs: Vec<_> = resolved.iter().collect();
                directory.add_group(group, &refs);
            }

            let services = EngineServices::in_memory()
                .with_directory(directory.clone())
                .with_config(config);
            let engine = Engine::new(services);

            let definition = load_definition_from_yaml(&file.to_string_lossy())?;
            let definition_id = engine.deploy_definition(definition)?;

            let initial_vars: HashMap<_, _> = vars.into_iter().collect();
            let process_id = engine.start_process(&definition_id, initial_vars).await?;
            info!(%process_id, "Process started");
            print_tasks(&engine, process_id).await?;

            for name in completions {
                let actor = directory
                    .actor(&name)
                    .ok_or_else(|| anyhow!("Unknown actor: {}", name))?;
                let task = engine
                    .assigned_tasks(process_id, &actor)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("Actor {} has no open task", name))?;
                let satisfied = engine.complete_task(task.id, &actor).await?;
                println!("{} completed '{}' (satisfied: {})", name, task.name, satisfied);
                print_tasks(&engine, process_id).await?;
            }

            let process = engine.process(process_id)?;
            println!("Process {} status: {:?}", process_id, process.status);
        }
    }

    Ok(())
}
