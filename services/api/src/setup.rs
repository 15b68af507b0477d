//! Startup wiring shared by the `api` and `tutor-repl` binaries.

use crate::{config::Config, db::Db};
use anyhow::Context;
use async_openai::config::OpenAIConfig;
use sqlx::PgPool;
use std::{collections::HashMap, fs, path::Path, sync::Arc};
use tracing::{Level, info, warn};
use tutor_core::{
    oracle::{OpenAICompatibleOracle, Oracle},
    prompts::Prompts,
    session::SessionMachine,
    store::{MemoryStore, Store},
};

/// Installs the fmt subscriber with RFC 3339 local timestamps.
pub fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
}

/// Reads every `.md` file in `prompts_path`, keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

/// Built-in prompts, overridden by any templates found in `prompts_path`.
pub fn prompts_from(prompts_path: &Path) -> anyhow::Result<Prompts> {
    if !prompts_path.is_dir() {
        info!(path = %prompts_path.display(), "No prompts directory, using built-in prompts.");
        return Ok(Prompts::default());
    }
    let overrides = load_prompts(prompts_path)?;
    info!(count = overrides.len(), "Loaded prompt overrides.");
    Ok(Prompts::with_overrides(&overrides))
}

pub fn build_oracle(config: &Config) -> anyhow::Result<Arc<dyn Oracle>> {
    let api_key = config
        .api_key()
        .context("API key for the configured provider is missing")?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.api_base());
    Ok(Arc::new(OpenAICompatibleOracle::new(
        openai_config,
        config.chat_model.clone(),
        config.oracle_timeout,
    )))
}

/// Postgres when `DATABASE_URL` is set (migrations applied), memory otherwise.
pub async fn connect_store(config: &Config) -> anyhow::Result<(Arc<dyn Store>, Option<Arc<Db>>)> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to database")?;
            let db = Arc::new(Db::new(pool));
            db.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            let store: Arc<dyn Store> = db.clone();
            Ok((store, Some(db)))
        }
        None => {
            warn!("DATABASE_URL is not set. Using the in-memory store; nothing survives a restart.");
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            Ok((store, None))
        }
    }
}

/// Builds the tutoring core from configuration.
pub async fn build_machine(config: &Config) -> anyhow::Result<(SessionMachine, Option<Arc<Db>>)> {
    let prompts = prompts_from(&config.prompts_path)?;
    let oracle = build_oracle(config)?;
    let (store, db) = connect_store(config).await?;
    let machine = SessionMachine::new(oracle, store, prompts, config.tutor.clone());
    Ok((machine, db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prompts_dir_uses_defaults() {
        let prompts = prompts_from(Path::new("/definitely/not/here")).unwrap();
        assert_eq!(prompts.explain, Prompts::default().explain);
    }

    #[test]
    fn loads_markdown_prompts_by_stem() {
        let dir = std::env::temp_dir().join(format!("tutor-prompts-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("hint.md"), "Custom hint for {missing}").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let loaded = load_prompts(&dir).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["hint"], "Custom hint for {missing}");

        let prompts = prompts_from(&dir).unwrap();
        assert_eq!(prompts.hint, "Custom hint for {missing}");
        assert_eq!(prompts.explain, Prompts::default().explain);

        fs::remove_dir_all(&dir).unwrap();
    }
}
