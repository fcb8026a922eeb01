use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info, Level};

use swarm_core::provider::ChatModel;
use swarm_engine::tools::{MemoryManagerTool, SharedMemoryTool, SubagentDefaults, SubagentManagerTool};
use swarm_engine::{Agent, ModelConfig, SubagentConfig, SubagentManager, ToolDispatcher, ToolRegistry, ToolSource};
use swarm_llm::{ClientConfig, OpenRouterClient};
use swarm_settings::{load_settings, load_settings_from_path, SwarmSettings};
use swarm_store::SharedMemory;
use swarm_telemetry::{init_telemetry, TelemetryConfig};

const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gemini", "google/gemini-2.5-pro"),
    ("gpt-5", "openai/gpt-5"),
    ("grok", "x-ai/grok-4"),
    ("opus", "anthropic/claude-opus-4.1"),
    ("multi", "x-ai/grok-4-fast:free"),
];

const DEFAULT_SYSTEM_PROMPT: &str = "You are the Orchestrator, coordinating a team of subagents. \
Today is {current_date}. Break the work into focused tasks, create subagents for them with \
subagent_manager, run them, and collect their reports from shared_memory.";

#[derive(Debug, Parser)]
#[command(name = "swarm", version, about = "Run an orchestrator agent that coordinates subagents")]
struct Cli {
    /// gemini, gpt-5, grok, opus, multi, or a full provider/model id
    #[arg(short, long)]
    model: Option<String>,

    /// Debug logging for the swarm crates
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (defaults to ~/.swarm/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Input given to the orchestrator each cycle
    #[arg(short, long)]
    prompt: Option<String>,

    /// Orchestrator system prompt; `{current_date}` is replaced with today's date
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,

    /// Stop after this many cycles instead of running until Ctrl-C
    #[arg(long)]
    cycles: Option<u32>,
}

fn resolve_model(name: &str) -> anyhow::Result<String> {
    let lower = name.to_lowercase();
    if let Some((_, id)) = MODEL_ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return Ok((*id).to_string());
    }
    if name.contains('/') {
        return Ok(name.to_string());
    }
    let aliases: Vec<&str> = MODEL_ALIASES.iter().map(|(alias, _)| *alias).collect();
    bail!(
        "invalid model '{name}': use one of {} or a provider/model id",
        aliases.join(", ")
    )
}

fn load_system_prompt(path: Option<&Path>, current_date: &str) -> anyhow::Result<String> {
    let template = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read system prompt {}", path.display()))?,
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };
    Ok(template.replace("{current_date}", current_date))
}

fn telemetry_config(settings: &SwarmSettings, verbose: bool) -> TelemetryConfig {
    let config = TelemetryConfig {
        log_level: settings.logging.level.parse().unwrap_or(Level::INFO),
        module_levels: Vec::new(),
        json: settings.logging.json,
    };
    if verbose {
        config.verbose()
    } else {
        config
    }
}

fn build_orchestrator(
    settings: &SwarmSettings,
    model_id: String,
    model: Arc<dyn ChatModel>,
    memory: Arc<SharedMemory>,
    system_prompt: String,
) -> Agent {
    let config = ModelConfig {
        model: model_id,
        max_tokens: settings.model.max_tokens,
        temperature: settings.model.temperature,
        context_window_tokens: settings.model.context_window_tokens,
    };
    let dispatcher = ToolDispatcher::new(
        settings.agent.parallel_tools,
        Duration::from_secs(settings.agent.tool_timeout_secs),
    );
    let defaults = SubagentDefaults {
        model: ModelConfig {
            max_tokens: settings.subagent.max_tokens,
            ..config.clone()
        },
        limits: SubagentConfig {
            max_iterations: settings.subagent.max_iterations,
            max_total_tokens: settings.subagent.max_total_tokens,
            termination_tools: Vec::new(),
            require_termination_tool: settings.subagent.require_termination_tool,
        },
        task_id: settings.agent.task_id.clone(),
        dispatcher: dispatcher.clone(),
    };

    let subagents = SubagentManagerTool::new(
        Arc::new(SubagentManager::new()),
        Arc::clone(&model),
        Arc::clone(&memory),
        ToolRegistry::new(),
    )
    .with_defaults(defaults);

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(subagents), ToolSource::Coordination);
    tools.register(Arc::new(MemoryManagerTool::new(Arc::clone(&memory))), ToolSource::Coordination);
    tools.register(
        Arc::new(SharedMemoryTool::new(memory, &settings.agent.name, &settings.agent.task_id)),
        ToolSource::Coordination,
    );

    Agent::new(&settings.agent.name, system_prompt, model, config)
        .with_tools(tools)
        .with_dispatcher(dispatcher)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)?,
        None => load_settings()?,
    };
    init_telemetry(&telemetry_config(&settings, cli.verbose)).context("failed to install logging")?;

    let api_key = std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .with_context(|| format!("{API_KEY_ENV} environment variable is required"))?;
    let model_id = match &cli.model {
        Some(name) => resolve_model(name)?,
        None => settings.model.model.clone(),
    };

    let client = OpenRouterClient::new(
        ClientConfig::new(api_key)
            .with_base_url(&settings.model.base_url)
            .with_timeout(Duration::from_secs(settings.model.request_timeout_secs)),
    )?;
    let memory = Arc::new(
        SharedMemory::open(&settings.memory.dir, settings.memory.auto_persist)
            .with_context(|| format!("failed to open shared memory at {}", settings.memory.dir))?,
    );

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let system_prompt = load_system_prompt(cli.system_prompt_file.as_deref(), &today)?;
    let mut orchestrator =
        build_orchestrator(&settings, model_id.clone(), Arc::new(client), Arc::clone(&memory), system_prompt);
    let prompt = cli.prompt.clone().unwrap_or_else(|| settings.agent.default_prompt.clone());

    info!(
        model = %model_id,
        memory_entries = memory.len(),
        tools = ?orchestrator.tools().names(),
        "orchestrator ready"
    );

    let mut cycle: u32 = 0;
    loop {
        if cli.cycles.is_some_and(|max| cycle >= max) {
            break;
        }
        cycle += 1;
        tokio::select! {
            result = orchestrator.run(&prompt) => match result {
                Ok(reply) => {
                    info!(cycle, "cycle complete");
                    println!("{}", reply.text_content());
                }
                Err(e) => error!(cycle, kind = e.kind(), error = %e, "cycle failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!(cycle, "interrupted");
                break;
            }
        }
    }

    let stats = memory.stats();
    info!(cycles = cycle, entries = stats.total_entries, "shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_llm::{MockModel, MockResponse};

    #[test]
    fn aliases_resolve_case_insensitively() {
        assert_eq!(resolve_model("Gemini").unwrap(), "google/gemini-2.5-pro");
        assert_eq!(resolve_model("multi").unwrap(), "x-ai/grok-4-fast:free");
        assert_eq!(resolve_model("meta/llama-4").unwrap(), "meta/llama-4");
        let err = resolve_model("llama").unwrap_err();
        assert!(err.to_string().contains("gemini, gpt-5, grok, opus, multi"));
    }

    #[test]
    fn system_prompt_substitutes_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.md");
        std::fs::write(&path, "Date: {current_date}. Again {current_date}.").unwrap();
        let prompt = load_system_prompt(Some(&path), "2025-01-02").unwrap();
        assert_eq!(prompt, "Date: 2025-01-02. Again 2025-01-02.");

        let default = load_system_prompt(None, "2025-01-02").unwrap();
        assert!(default.contains("Today is 2025-01-02."));
        assert!(load_system_prompt(Some(&dir.path().join("missing.md")), "x").is_err());
    }

    #[test]
    fn verbose_raises_swarm_crates() {
        let settings = SwarmSettings::default();
        let config = telemetry_config(&settings, true);
        assert!(config.filter_directive().contains("swarm_engine=debug"));
        assert_eq!(telemetry_config(&settings, false).filter_directive(), "info");
    }

    #[tokio::test]
    async fn orchestrator_gets_coordination_tools() {
        let settings = SwarmSettings::default();
        let model = Arc::new(MockModel::new(vec![MockResponse::text("planned")]));
        let memory = Arc::new(SharedMemory::in_memory());
        let mut agent = build_orchestrator(&settings, "openai/gpt-5".into(), model, memory, "sys".into());

        assert_eq!(agent.name(), "Orchestrator");
        assert_eq!(
            agent.tools().names(),
            vec!["memory_manager", "shared_memory", "subagent_manager"]
        );
        let reply = agent.run("go").await.unwrap();
        assert_eq!(reply.text_content(), "planned");
    }
}
