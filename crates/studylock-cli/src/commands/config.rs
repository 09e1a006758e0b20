use chrono::Local;
use clap::Subcommand;
use studylock_core::{overrides::encode_credential, ConfigError, SessionConfig};

use super::common::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "work_minutes", "blocking.hosts_path")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Set the override password
    SetPassword {
        password: String,
    },
}

pub fn run(action: ConfigAction, dry_run: bool) -> CmdResult {
    let now = Local::now();
    let mut ctx = Context::open(dry_run, now)?;

    let updated = match action {
        ConfigAction::Get { key } => {
            let value = ctx
                .controller
                .config()
                .get(&key)
                .ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
            return Ok(());
        }
        ConfigAction::List => return print_json(ctx.controller.config()),
        ConfigAction::Set { key, value } => {
            let mut config = ctx.controller.config().clone();
            config.set(&key, &value)?;
            config
        }
        ConfigAction::Reset => SessionConfig::default(),
        ConfigAction::SetPassword { password } => {
            if password.trim().is_empty() {
                return Err("password must not be empty".into());
            }
            let mut config = ctx.controller.config().clone();
            config.override_password_hash = encode_credential(&password)
                .map_err(|e| format!("could not generate salt: {e}"))?;
            config
        }
    };

    ctx.ensure_exclusive()?;
    ctx.controller.update_config(updated, now)?;
    ctx.finish(now)?;
    println!("ok");
    Ok(())
}
