//! `agenx run`: Run a task with the configured team.

use std::path::PathBuf;
use std::sync::Arc;

use agenx_agent::TeamBuilder;
use agenx_config::{init_results, save_results};
use agenx_console::{Console, StdinInput, UserInputManager};
use agenx_core::event::TerminalResult;
use agenx_core::CancellationToken;
use agenx_providers::BackendRouter;
use tracing::{info, warn};

pub async fn run(
    config: Option<PathBuf>,
    task: String,
    principled: bool,
    prompted: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config)?;
    super::require_api_key(&config)?;

    // Flags only switch modes on; the config decides otherwise
    config.planner.principled |= principled;
    config.planner.prompted |= prompted;

    let mut router = BackendRouter::new(&config);
    let tools = agenx_tools::default_registry(&config.tools);
    let input = UserInputManager::new(Arc::new(StdinInput));

    let team = TeamBuilder::new(&config, tools)
        .with_input(input.clone())
        .build(&mut router)?;
    info!(participants = ?team.participant_names(), "Team ready");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling the run");
                cancel.cancel();
            }
        });
    }

    let mut console = Console::stdout()
        .with_output_stats(config.console.output_stats)
        .with_input_manager(input);
    let result = console.consume(team.run_stream(task, cancel)).await?;

    if let Some(save_dir) = &config.results.save_dir {
        init_results(save_dir, &config)?;
        if let TerminalResult::TaskResult(task_result) = &result {
            let value = serde_json::to_value(task_result)?;
            save_results(&value, &save_dir.join("task_result.json"))?;
        }
    }

    Ok(())
}
