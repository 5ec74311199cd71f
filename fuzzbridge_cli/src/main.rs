use fuzzbridge_core::FuzzbridgeConfig;
use fuzzbridge_core::config::LauncherSettings;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, Stdio};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = "\
Any arguments after the target are passed to the engine unchanged.
For libFuzzer flags see https://llvm.org/docs/LibFuzzer.html

Examples:
  fuzzbridge --target_path=./regex_harness
  fuzzbridge --target_path=/home/fuzz/regex_harness -jobs=8";

#[derive(Parser, Debug)]
#[clap(author, version, about = "Runs a fuzzbridge harness under the libFuzzer engine", after_help = AFTER_HELP)]
struct Cli {
    /// Configuration file (defaults to ./fuzzbridge.toml when present)
    #[clap(long, value_parser)]
    config: Option<PathBuf>,
    /// Harness executable to fuzz
    #[clap(long = "target_path")]
    target_path: Option<PathBuf>,
    /// Extra engine flags
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    engine_args: Vec<String>,
}

/// Engine build suffix for the running architecture, if one is shipped for it.
fn arch_suffix(arch: &str) -> Option<&'static str> {
    match arch {
        "x86_64" => Some("x64"),
        "x86" => Some("x86"),
        _ => None,
    }
}

fn engine_path(settings: &LauncherSettings, suffix: &str) -> Result<PathBuf, anyhow::Error> {
    let dir = match &settings.engine_dir {
        Some(dir) => dir.clone(),
        None => {
            let exe = std::env::current_exe().context("Failed to locate the launcher executable")?;
            exe.parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| anyhow::anyhow!("Launcher path {exe:?} has no parent directory"))?
        }
    };
    Ok(dir.join(format!("{}-{}", settings.engine_prefix, suffix)))
}

fn engine_command(engine: &Path, target: &Path, passthrough: &[String]) -> Command {
    let mut command = Command::new(engine);
    command
        .arg(format!("--target_path={}", target.display()))
        .args(passthrough)
        .stdin(Stdio::null())
        .stderr(Stdio::piped());
    command
}

fn load_config(path: Option<&Path>) -> Result<FuzzbridgeConfig, anyhow::Error> {
    match path {
        Some(config_path) => {
            tracing::info!(path = ?config_path, "loading configuration");
            FuzzbridgeConfig::load_from_file(config_path)
        }
        None => {
            let default_config_path = PathBuf::from("fuzzbridge.toml");
            if default_config_path.exists() {
                tracing::info!(path = ?default_config_path, "loading default configuration");
                FuzzbridgeConfig::load_from_file(&default_config_path)
            } else {
                tracing::debug!("no configuration file, using built-in defaults");
                Ok(FuzzbridgeConfig::default())
            }
        }
    }
}

fn main() -> Result<ExitCode, anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !cfg!(unix) {
        println!("fuzzbridge needs FIFOs and POSIX shared memory; only Unix hosts are supported.");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(target) = cli.target_path else {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let Some(suffix) = arch_suffix(std::env::consts::ARCH) else {
        println!(
            "Architecture {} is unsupported (x86 or x86_64 required).",
            std::env::consts::ARCH
        );
        return Ok(ExitCode::SUCCESS);
    };

    let config = load_config(cli.config.as_deref())?;
    let engine = engine_path(&config.launcher_settings(), suffix)?;
    tracing::info!(engine = ?engine, target = ?target, "starting engine");

    println!("Executing process...");
    let mut child = match engine_command(&engine, &target, &cli.engine_args).spawn() {
        Ok(child) => child,
        Err(e) => {
            println!("Engine {engine:?} failed to start: {e}. Aborting...");
            return Ok(ExitCode::FAILURE);
        }
    };

    let pid = child.id() as libc::pid_t;
    ctrlc::set_handler(move || {
        println!("Interrupt detected, stopping fuzzbridge engine");
        let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
        if rc != 0 {
            tracing::warn!(pid, error = %std::io::Error::last_os_error(), "failed to kill engine");
        }
        std::process::exit(0);
    })
    .context("Failed to install Ctrl-C handler")?;

    let relay = child.stderr.take().map(|stderr| {
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => println!("{line}"),
                    Err(e) => {
                        tracing::debug!(error = %e, "engine output closed");
                        break;
                    }
                }
            }
        })
    });

    let status = child.wait().context("Failed to wait for the engine")?;
    if let Some(relay) = relay {
        if relay.join().is_err() {
            tracing::warn!("stderr relay thread panicked");
        }
    }
    tracing::info!(%status, "engine exited");
    println!("fuzzbridge engine exited.");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: Option<&str>) -> LauncherSettings {
        LauncherSettings {
            engine_dir: dir.map(PathBuf::from),
            engine_prefix: fuzzbridge_core::config::default_engine_prefix(),
        }
    }

    #[test]
    fn only_x86_family_has_engine_builds() {
        assert_eq!(arch_suffix("x86_64"), Some("x64"));
        assert_eq!(arch_suffix("x86"), Some("x86"));
        assert_eq!(arch_suffix("aarch64"), None);
    }

    #[test]
    fn engine_lives_in_the_configured_dir() {
        let path = engine_path(&settings(Some("/opt/engines")), "x64").unwrap();
        assert_eq!(path, PathBuf::from("/opt/engines/fuzzbridge-libfuzzer-x64"));
    }

    #[test]
    fn engine_defaults_to_the_launcher_dir() {
        let path = engine_path(&settings(None), "x86").unwrap();
        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert_eq!(path, exe_dir.join("fuzzbridge-libfuzzer-x86"));
    }

    #[test]
    fn target_then_passthrough_args_reach_the_engine() {
        let cli = Cli::try_parse_from([
            "fuzzbridge",
            "--target_path=./harness",
            "-jobs=8",
            "-max_len=4096",
        ])
        .unwrap();
        assert_eq!(cli.target_path, Some(PathBuf::from("./harness")));
        assert_eq!(cli.engine_args, vec!["-jobs=8", "-max_len=4096"]);

        let command = engine_command(
            Path::new("/opt/engine"),
            Path::new("./harness"),
            &cli.engine_args,
        );
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["--target_path=./harness", "-jobs=8", "-max_len=4096"]);
        assert_eq!(command.get_program(), "/opt/engine");
    }

    #[test]
    fn config_flag_is_optional() {
        let cli =
            Cli::try_parse_from(["fuzzbridge", "--config", "f.toml", "--target_path=h"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("f.toml")));
        assert!(cli.engine_args.is_empty());

        let cli = Cli::try_parse_from(["fuzzbridge"]).unwrap();
        assert!(cli.target_path.is_none());
    }
}
