//! `memloop onboard`: first-time setup.

use super::{local_user_id, prompts_dir, CliResult};
use memloop_config::AppConfig;

pub async fn run() -> CliResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🧠 memloop: First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let prompts = prompts_dir(&config);
    for kind in ["personas", "humans", "system"] {
        let dir = prompts.join(kind);
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
            println!("✅ Created {}", dir.display());
        }
    }

    let user = local_user_id()?;
    println!("  User id: {user}");

    println!("\n📝 Next steps:");
    println!("   1. Point `model_endpoint` in {} at your model server", config_path.display());
    println!("   2. Optionally drop <name>.txt files into {}/personas and /humans", prompts.display());
    println!("   3. Run: memloop run --agent my_agent\n");

    Ok(())
}
