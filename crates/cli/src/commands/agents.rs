//! `memloop agents`: list saved agents.

use super::{local_user_id, CliResult, Stores};
use memloop_config::AppConfig;

pub async fn run() -> CliResult {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let user = local_user_id()?;
    let stores = Stores::open(&config);

    let names = stores.agents.list_agents(user).await?;
    if names.is_empty() {
        println!("No agents yet. Create one with `memloop run --agent <name>`.");
        return Ok(());
    }

    println!("🧠 Agents");
    println!("=========");
    for name in names {
        match stores.agents.get_agent_state(&name, user).await? {
            Some(state) => println!(
                "  {:<20} preset={} persona={} human={} messages={} created={}",
                state.name,
                state.preset,
                state.persona_name,
                state.human_name,
                state.state.messages.len(),
                state.created_at.format("%Y-%m-%d %H:%M UTC"),
            ),
            None => println!("  {name}"),
        }
    }
    Ok(())
}
