use fuzzbridge_core::{FuzzbridgeConfig, RunOutcome};
use fuzzbridge_core::{cleanup, initialize, record_edge, run_with_settings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

static KEYWORDS: &[&[u8]] = &[b"BAD", b"CRASH"];

fn my_harness(data: &[u8]) {
    record_edge(0x1001);
    for (i, keyword) in KEYWORDS.iter().enumerate() {
        let mut matched = 0;
        for (a, b) in data.iter().zip(keyword.iter()) {
            if a != b {
                break;
            }
            matched += 1;
            record_edge(0x2000 + ((i as u32) << 8) + matched);
        }
        if matched as usize == keyword.len() {
            record_edge(0x3000 + i as u32);
            panic!("{} input detected by harness!", String::from_utf8_lossy(keyword));
        }
    }
}

fn load_config() -> Result<FuzzbridgeConfig, anyhow::Error> {
    let path = PathBuf::from("fuzzbridge.toml");
    if path.exists() {
        tracing::info!(path = ?path, "loading configuration");
        FuzzbridgeConfig::load_from_file(&path)
    } else {
        Ok(FuzzbridgeConfig::default())
    }
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;

    let keywords = initialize(|| {
        record_edge(0x0001);
        KEYWORDS.len()
    })?;
    tracing::info!(keywords, "harness ready");

    let outcome = run_with_settings(&config.bridge, my_harness)?;

    cleanup(|| record_edge(0x0002))?;

    if let RunOutcome::Session(report) = outcome {
        tracing::info!(executions = report.executions, end = ?report.end, "harness exiting");
    }
    Ok(())
}
