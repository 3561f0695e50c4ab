//! `agenx select`: Ask the selector for the next speaker once.

use agenx_agent::Selector;
use agenx_core::message::Message;
use agenx_core::CancellationToken;
use agenx_providers::BackendRouter;

pub async fn run(
    config: Option<std::path::PathBuf>,
    order: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config)?;
    super::require_api_key(&config)?;

    let mut router = BackendRouter::new(&config);
    let selector = Selector::new(router.selector_backend()?);

    let history: Vec<Message> = order
        .iter()
        .map(|name| Message::assistant(name.trim(), ""))
        .collect();

    match selector.select_next(&history, &CancellationToken::new()).await? {
        Some(name) => println!("{name}"),
        None => println!("(none)"),
    }
    Ok(())
}
