//! 🚀 mcl-cli — the front door. Flags in, logging up, config loaded, then `mcl::run` does the rest.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin on purpose. Like a manager. 🦆

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Load gzipped app-install TSV files into memcached
#[derive(Parser, Debug)]
#[command(name = "mcl")]
#[command(about = "Load gzipped app-install TSV files into memcached", long_about = None)]
struct Cli {
    /// TOML config file. Used only if it exists; env vars (MCL_*) and defaults cover the rest.
    #[arg(long, default_value = "mcl.toml")]
    config: PathBuf,
    /// Glob of input files. Overrides `pattern` from the config.
    #[arg(long)]
    pattern: Option<String>,
    /// Log what would be written instead of writing it.
    #[arg(long)]
    dry: bool,
    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log: Option<PathBuf>,
    /// memcached address for idfa records.
    #[arg(long)]
    idfa: Option<String>,
    /// memcached address for gaid records.
    #[arg(long)]
    gaid: Option<String>,
    /// memcached address for adid records.
    #[arg(long)]
    adid: Option<String>,
    /// memcached address for dvid records.
    #[arg(long)]
    dvid: Option<String>,
    /// Round-trip built-in sample lines through the parser and the wire codec, then exit.
    #[arg(short = 't', long)]
    test: bool,
}

impl Cli {
    /// 🔧 Flags beat the file, the file beats the env, the env beats the defaults.
    fn apply(&self, app_config: &mut mcl::AppConfig) {
        if let Some(pattern) = &self.pattern {
            app_config.pattern = pattern.clone();
        }
        if self.dry {
            app_config.dry_run = true;
        }
        for (category, address) in [
            ("idfa", &self.idfa),
            ("gaid", &self.gaid),
            ("adid", &self.adid),
            ("dvid", &self.dvid),
        ] {
            if let Some(address) = address {
                app_config.routes.insert(category.to_string(), address.clone());
            }
        }
    }
}

/// 📡 Tracing: stderr by default, a plain-text file with `--log`. `RUST_LOG` wins if set.
fn init_tracing(cli: &Cli) -> Result<()> {
    let default_level = if cli.dry { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match &cli.log {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("💀 Could not open log file '{}'", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

fn config_file(path: &Path) -> Result<Option<&Path>> {
    let exists = path.try_exists().with_context(|| {
        format!(
            "💀 Couldn't even check whether '{}' exists. Permissions, probably. It's always permissions.",
            path.display()
        )
    })?;
    Ok(exists.then_some(path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    if cli.test {
        mcl::self_check().context("💀 The wire format self-check failed")?;
        info!("✅ Self-check passed: sample records survive parse → encode → decode");
        return Ok(());
    }

    let result = async {
        let mut app_config = mcl::app_config::load_config(config_file(&cli.config)?)
            .context("💀 Couldn't load the config. Check the file and the MCL_* env vars.")?;
        cli.apply(&mut app_config);
        app_config
            .validate()
            .context("💀 The command-line flags turned a good config into a bad one")?;
        mcl::run(app_config).await
    }
    .await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut smells_like_a_connection_problem = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("Connection refused")
                || cause_str.contains("connection refused")
                || cause_str.contains("timed out")
            {
                smells_like_a_connection_problem = true;
            }
        }
        if smells_like_a_connection_problem {
            error!(
                "🔧 hint: a memcached isn't answering. Check the routes (--idfa/--gaid/--adid/--dvid) \
                 and that every memcached is actually up."
            );
        }
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_flags_override_the_config() {
        let cli = Cli::parse_from([
            "mcl",
            "--pattern",
            "/tmp/*.gz",
            "--dry",
            "--gaid",
            "10.0.0.2:11211",
        ]);
        let mut app_config = mcl::AppConfig::default();

        cli.apply(&mut app_config);

        assert_eq!(app_config.pattern, "/tmp/*.gz");
        assert!(app_config.dry_run);
        assert_eq!(app_config.routes["gaid"], "10.0.0.2:11211");
        assert_eq!(app_config.routes["idfa"], "127.0.0.1:33013");
    }

    #[test]
    fn the_one_where_a_missing_config_file_is_fine() {
        let path = Path::new("/definitely/not/here/mcl.toml");
        assert_eq!(config_file(path).expect("💀 checking should work"), None);
    }

    #[test]
    fn the_one_where_dash_t_asks_for_the_self_check() {
        let cli = Cli::parse_from(["mcl", "-t"]);
        assert!(cli.test);
        assert!(!Cli::parse_from(["mcl"]).test);
    }
}
