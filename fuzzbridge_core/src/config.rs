use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_SHM_ENV_VAR: &str = "__LIBFUZZER_SHM_ID";
pub const DEFAULT_CONTROL_PIPE_ENV_VAR: &str = "__LIBFUZZER_CTL_PIPE";
pub const DEFAULT_STATUS_PIPE_ENV_VAR: &str = "__LIBFUZZER_ST_PIPE";

/// Where the harness finds the engine's shared segment and pipes.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BridgeSettings {
    #[serde(default = "default_shm_env_var")]
    pub shm_env_var: String,
    #[serde(default = "default_control_pipe_env_var")]
    pub control_pipe_env_var: String,
    #[serde(default = "default_status_pipe_env_var")]
    pub status_pipe_env_var: String,
    /// Directory holding named shared-memory segments. Segment ids that are
    /// already paths are used as-is.
    #[serde(default = "default_shm_dir")]
    pub shm_dir: PathBuf,
    /// Directory holding the engine's FIFOs. Pipe names that are already paths
    /// are used as-is.
    #[serde(default = "default_pipe_dir")]
    pub pipe_dir: PathBuf,
}

fn default_shm_env_var() -> String {
    DEFAULT_SHM_ENV_VAR.to_string()
}

fn default_control_pipe_env_var() -> String {
    DEFAULT_CONTROL_PIPE_ENV_VAR.to_string()
}

fn default_status_pipe_env_var() -> String {
    DEFAULT_STATUS_PIPE_ENV_VAR.to_string()
}

pub fn default_shm_dir() -> PathBuf {
    PathBuf::from("/dev/shm")
}

pub fn default_pipe_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            shm_env_var: default_shm_env_var(),
            control_pipe_env_var: default_control_pipe_env_var(),
            status_pipe_env_var: default_status_pipe_env_var(),
            shm_dir: default_shm_dir(),
            pipe_dir: default_pipe_dir(),
        }
    }
}

impl BridgeSettings {
    pub fn resolve_segment(&self, id: &str) -> PathBuf {
        resolve_in(&self.shm_dir, id)
    }

    pub fn resolve_pipe(&self, name: &str) -> PathBuf {
        resolve_in(&self.pipe_dir, name)
    }
}

// POSIX object names may carry a single leading slash ("/name"); anything with
// a further separator is a filesystem path.
fn resolve_in(dir: &Path, name: &str) -> PathBuf {
    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.contains('/') {
        PathBuf::from(name)
    } else {
        dir.join(bare)
    }
}

/// How the launcher finds the native engine executable.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct LauncherSettings {
    /// Directory holding the engine builds. Defaults to the launcher's own directory.
    pub engine_dir: Option<PathBuf>,
    #[serde(default = "default_engine_prefix")]
    pub engine_prefix: String,
}

pub fn default_engine_prefix() -> String {
    "fuzzbridge-libfuzzer".to_string()
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzbridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub launcher: Option<LauncherSettings>,
}

impl FuzzbridgeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: FuzzbridgeConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    pub fn launcher_settings(&self) -> LauncherSettings {
        self.launcher.clone().unwrap_or_else(|| LauncherSettings {
            engine_dir: None,
            engine_prefix: default_engine_prefix(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_libfuzzer_names() {
        let config: FuzzbridgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.bridge.shm_env_var, "__LIBFUZZER_SHM_ID");
        assert_eq!(config.bridge.control_pipe_env_var, "__LIBFUZZER_CTL_PIPE");
        assert_eq!(config.bridge.status_pipe_env_var, "__LIBFUZZER_ST_PIPE");
        assert_eq!(config.bridge.shm_dir, PathBuf::from("/dev/shm"));
        assert!(config.launcher.is_none());
        assert_eq!(
            config.launcher_settings().engine_prefix,
            "fuzzbridge-libfuzzer"
        );
    }

    #[test]
    fn loads_kebab_case_overrides_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[bridge]
shm-env-var = "MY_SHM"
pipe-dir = "/run/fuzz"

[launcher]
engine-dir = "/opt/engines"
"#
        )
        .unwrap();

        let config = FuzzbridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.bridge.shm_env_var, "MY_SHM");
        assert_eq!(config.bridge.status_pipe_env_var, "__LIBFUZZER_ST_PIPE");
        assert_eq!(config.bridge.pipe_dir, PathBuf::from("/run/fuzz"));
        let launcher = config.launcher_settings();
        assert_eq!(launcher.engine_dir, Some(PathBuf::from("/opt/engines")));
        assert_eq!(launcher.engine_prefix, "fuzzbridge-libfuzzer");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<FuzzbridgeConfig, _> = toml::from_str("[bridge]\nshm-id = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn names_resolve_under_their_directory_unless_already_paths() {
        let settings = BridgeSettings {
            pipe_dir: PathBuf::from("/tmp/pipes"),
            ..Default::default()
        };
        assert_eq!(
            settings.resolve_segment("__LIBFUZZER_SHM_42"),
            PathBuf::from("/dev/shm/__LIBFUZZER_SHM_42")
        );
        assert_eq!(
            settings.resolve_segment("/__LIBFUZZER_SHM_42"),
            PathBuf::from("/dev/shm/__LIBFUZZER_SHM_42")
        );
        assert_eq!(
            settings.resolve_pipe("__LIBFUZZER_CTL_PIPE_42"),
            PathBuf::from("/tmp/pipes/__LIBFUZZER_CTL_PIPE_42")
        );
        assert_eq!(
            settings.resolve_pipe("/var/run/ctl"),
            PathBuf::from("/var/run/ctl")
        );
    }

    #[test]
    fn missing_config_file_reports_path() {
        let err = FuzzbridgeConfig::load_from_file(Path::new("/nonexistent/fuzzbridge.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
