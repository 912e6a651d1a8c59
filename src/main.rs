pub mod models {
    pub mod entity;
    pub mod febos;
}

pub mod client;
pub mod config;
pub mod env_file;
pub mod normalization {
    pub mod input;
    pub mod resolver;
}
pub mod services {
    pub mod discovery;
    pub mod realtime;
    pub mod update;
    pub mod write;
}
pub mod session;
pub mod utils;

#[cfg(test)]
mod testing;

use crate::client::FebosClient;
use crate::config::Config;
use crate::models::entity::{EntityKind, StateValue};
use crate::services::realtime;
use crate::session::Session;
use crate::utils::to_json_line;
use log::{error, info, warn};
use std::path::PathBuf;

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
    applied: usize,
}

#[derive(Debug, PartialEq)]
enum Mode {
    /// Steady-cadence refresh loop.
    Loop,
    /// One refresh, print the snapshot.
    Once,
    /// Print entity descriptors.
    Describe,
    /// One write, print the resulting snapshot.
    Set { key: String, value: StateValue },
}

#[derive(Debug, PartialEq)]
struct Cli {
    env_file: Option<PathBuf>,
    mode: Mode,
}

fn run(mode: Mode) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (user={}, base_url={}, refresh_interval={}s, rediscover_after={})",
        cfg.credentials.username,
        cfg.base_url,
        cfg.refresh_interval.as_secs(),
        cfg.rediscover_after_failures
    );

    // 2) Login and discover
    let session = Session::new(FebosClient::new(&cfg.base_url), cfg.credentials.clone());
    let count = session.connect()?;
    info!("Discovered {} input(s)", count);
    for id in session.failed_installations() {
        warn!("Installation {} was skipped due to configuration errors", id.0);
    }

    // 3) Act
    match mode {
        Mode::Describe => {
            for kind in [EntityKind::BinarySensor, EntityKind::Sensor, EntityKind::Switch, EntityKind::Number] {
                for descriptor in session.entities(kind) {
                    println!("{}", to_json_line(&descriptor));
                }
            }
        }
        Mode::Once => {
            let snapshot = session.refresh().map_err(|e| e.to_string())?;
            println!("{}", to_json_line(&snapshot));
        }
        Mode::Set { key, value } => {
            if let Some(d) = session.descriptor(&key) {
                info!("Writing {} to {} ({})", value, d.label, d.kind);
            }
            session.refresh().map_err(|e| e.to_string())?;
            let snapshot = session.write(&key, &value).map_err(|e| e.to_string())?;
            println!("{}", to_json_line(&snapshot));
        }
        Mode::Loop => {
            info!("Starting refresh loop: interval={}s", cfg.refresh_interval.as_secs());
            realtime::run_loop(&session, cfg.refresh_interval, cfg.rediscover_after_failures)?;
        }
    }

    Ok(())
}

fn parse_set(arg: &str) -> Result<Mode, String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| "`--set` expects <key>=<json value>".to_string())?;
    if key.is_empty() {
        return Err("`--set` key cannot be empty".to_string());
    }
    let value: StateValue =
        serde_json::from_str(raw).map_err(|e| format!("`--set` value is not a JSON scalar: {}", e))?;
    Ok(Mode::Set {
        key: key.to_string(),
        value,
    })
}

fn set_mode(m: Mode, mode: &mut Option<Mode>) -> Result<(), String> {
    if mode.is_some() {
        return Err("only one of `--once`, `--describe`, `--set` may be given".to_string());
    }
    *mode = Some(m);
    Ok(())
}

fn parse_cli<I: IntoIterator<Item = String>>(args: I) -> Result<Cli, String> {
    let mut args = args.into_iter();
    let mut env_file: Option<PathBuf> = None;
    let mut mode: Option<Mode> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--env-file" => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            s if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path = &s["--env-file=".len()..];
                if path.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path));
            }
            "--once" => set_mode(Mode::Once, &mut mode)?,
            "--describe" => set_mode(Mode::Describe, &mut mode)?,
            "--set" => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--set` requires <key>=<json value>".to_string())?;
                set_mode(parse_set(&value)?, &mut mode)?;
            }
            s if s.starts_with("--set=") => set_mode(parse_set(&s["--set=".len()..])?, &mut mode)?,
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }

    Ok(Cli {
        env_file,
        mode: mode.unwrap_or(Mode::Loop),
    })
}

fn configure_env(env_file: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        let applied = env_file::load(&path)?;
        return Ok(Some(LoadedEnvFile {
            path,
            explicit: true,
            applied,
        }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if !default_path.is_file() {
        return Ok(None);
    }
    let applied = env_file::load(&default_path)?;
    Ok(Some(LoadedEnvFile {
        path: default_path,
        explicit: false,
        applied,
    }))
}

fn main() {
    let args = match std::env::args_os()
        .skip(1)
        .map(|a| a.into_string())
        .collect::<Result<Vec<String>, _>>()
    {
        Ok(args) => args,
        Err(_) => {
            eprintln!("fatal: argument contains invalid UTF-8");
            std::process::exit(1);
        }
    };
    let cli = match parse_cli(args) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(2);
        }
    };
    let loaded_env = match configure_env(cli.env_file) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s))",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "febos-bridge {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.mode) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
