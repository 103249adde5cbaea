//! Configuration resolution
//!
//! Turns a per-session [`SessionConfig`] override, the global
//! [`ShellSettings`] and an explicit environment snapshot into the concrete
//! launch parameters of a session. Each field is looked up as
//! override, then global default, then an OS fallback, so resolution itself
//! never fails. The process environment is never read here: callers pass it in
//! (see [`os_environment`]).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ShellSettings;

/// Environment variable name to value
pub type EnvMap = BTreeMap<String, String>;

#[cfg(windows)]
const SHELL_VAR: &str = "COMSPEC";
#[cfg(not(windows))]
const SHELL_VAR: &str = "SHELL";

#[cfg(windows)]
const FALLBACK_SHELL: &str = "cmd.exe";
#[cfg(not(windows))]
const FALLBACK_SHELL: &str = "/bin/bash";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigResolutionError {
    #[error("No shell configured: the resolved shell path is empty")]
    EmptyShellPath,
}

/// Per-session overrides. `None` defers to the global settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub shell_path: Option<String>,
    /// Whitespace-delimited argument string
    pub shell_args: Option<String>,
    pub sanitize_environment: Option<Vec<String>>,
    pub working_directory: Option<PathBuf>,
}

/// What the host knows about the user's current context
pub trait HostContext {
    /// File backing the active editable document
    fn active_document(&self) -> Option<PathBuf>;

    /// Known project roots, in priority order
    fn project_roots(&self) -> Vec<PathBuf>;
}

/// A [`HostContext`] with a fixed answer
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub active_document: Option<PathBuf>,
    pub project_roots: Vec<PathBuf>,
}

impl StaticHost {
    pub fn new(project_roots: Vec<PathBuf>) -> Self {
        Self {
            active_document: None,
            project_roots,
        }
    }
}

impl HostContext for StaticHost {
    fn active_document(&self) -> Option<PathBuf> {
        self.active_document.clone()
    }

    fn project_roots(&self) -> Vec<PathBuf> {
        self.project_roots.clone()
    }
}

/// Fully defaulted launch parameters, fixed for the life of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub shell_path: String,
    /// The argument string as configured, kept for serialization
    pub shell_arguments: String,
    pub args: Vec<String>,
    pub environment_exclusions: Vec<String>,
    pub environment: EnvMap,
    pub working_directory: PathBuf,
}

impl ResolvedConfig {
    pub fn validate(&self) -> Result<(), ConfigResolutionError> {
        if self.shell_path.trim().is_empty() {
            return Err(ConfigResolutionError::EmptyShellPath);
        }
        Ok(())
    }
}

/// Resolves session configuration against global settings and an environment
pub struct ConfigResolver<'a> {
    settings: &'a ShellSettings,
    env: &'a EnvMap,
    host: &'a dyn HostContext,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(settings: &'a ShellSettings, env: &'a EnvMap, host: &'a dyn HostContext) -> Self {
        Self { settings, env, host }
    }

    pub fn resolve(&self, overrides: &SessionConfig) -> ResolvedConfig {
        let shell_path = resolve_shell_path(
            overrides.shell_path.as_deref(),
            self.settings.path.as_deref(),
            self.env,
        );
        let wants_login = shell_path == os_shell(self.env)
            && is_login_shell(&shell_path, &self.settings.login_shells);
        let shell_arguments = resolve_shell_arguments(
            overrides.shell_args.as_deref(),
            self.settings.args.as_deref(),
            self.settings.login_args.as_deref().filter(|_| wants_login),
        );
        let environment_exclusions = overrides
            .sanitize_environment
            .clone()
            .unwrap_or_else(|| self.settings.sanitize_environment.clone());
        let environment = resolve_environment(self.env, &environment_exclusions);
        let working_directory = resolve_working_directory(
            overrides.working_directory.as_deref(),
            self.host,
            self.env,
        );

        ResolvedConfig {
            args: tokenize_arguments(&shell_arguments),
            shell_path,
            shell_arguments,
            environment_exclusions,
            environment,
            working_directory,
        }
    }
}

/// Override, then global default, then the OS shell. Empty strings are skipped.
pub fn resolve_shell_path(overridden: Option<&str>, global: Option<&str>, env: &EnvMap) -> String {
    overridden
        .filter(|s| !s.is_empty())
        .or_else(|| global.filter(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| os_shell(env))
}

/// The shell named by `SHELL` (`COMSPEC` on Windows), else a platform default
pub fn os_shell(env: &EnvMap) -> String {
    env.get(SHELL_VAR)
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}

/// Whether the file name of `shell_path` is one of `login_shells`
pub fn is_login_shell(shell_path: &str, login_shells: &[String]) -> bool {
    Path::new(shell_path)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| login_shells.iter().any(|shell| shell == name))
}

/// The argument string to launch with.
///
/// A present override or global default wins even when empty. Otherwise
/// `login_args` is used; callers pass it only when the resolved shell is the
/// OS shell and a login shell (see [`is_login_shell`]).
pub fn resolve_shell_arguments(
    overridden: Option<&str>,
    global: Option<&str>,
    login_args: Option<&str>,
) -> String {
    overridden
        .or(global)
        .or(login_args)
        .unwrap_or_default()
        .to_string()
}

/// Split on runs of whitespace, dropping empty tokens
pub fn tokenize_arguments(arguments: &str) -> Vec<String> {
    arguments.split_whitespace().map(str::to_string).collect()
}

/// Copy of `env` without the excluded names
pub fn resolve_environment(env: &EnvMap, exclusions: &[String]) -> EnvMap {
    let mut environment = env.clone();
    for name in exclusions {
        environment.remove(name);
    }
    environment
}

/// Override if present, else the project of the active document, else the
/// first project root, else home.
pub fn resolve_working_directory(
    overridden: Option<&Path>,
    host: &dyn HostContext,
    env: &EnvMap,
) -> PathBuf {
    if let Some(dir) = overridden {
        return if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            absolutize(dir)
        };
    }

    let roots = host.project_roots();
    let from_document = host
        .active_document()
        .and_then(|doc| roots.iter().find(|root| doc.starts_with(root)).cloned());

    let dir = from_document
        .or_else(|| roots.into_iter().next())
        .or_else(|| home_dir(env))
        .unwrap_or_else(|| PathBuf::from("/"));
    absolutize(&dir)
}

fn home_dir(env: &EnvMap) -> Option<PathBuf> {
    env.get("USERPROFILE")
        .or_else(|| env.get("HOME"))
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

// Resolve symlinks where the path exists; otherwise just anchor it
fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Snapshot of the process environment. Non-UTF-8 entries are skipped.
pub fn os_environment() -> EnvMap {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_shell_path_precedence() {
        let env = env(&[(SHELL_VAR, "/usr/bin/fish")]);
        assert_eq!(resolve_shell_path(Some("/bin/zsh"), Some("/bin/bash"), &env), "/bin/zsh");
        assert_eq!(resolve_shell_path(None, Some("/bin/bash"), &env), "/bin/bash");
        assert_eq!(resolve_shell_path(Some(""), Some("/bin/bash"), &env), "/bin/bash");
        assert_eq!(resolve_shell_path(None, None, &env), "/usr/bin/fish");
        assert_eq!(resolve_shell_path(None, Some(""), &EnvMap::new()), FALLBACK_SHELL);
    }

    #[test]
    fn test_argument_tokenization() {
        assert_eq!(tokenize_arguments("  -l   --foo "), vec!["-l", "--foo"]);
        assert!(tokenize_arguments("   ").is_empty());
        assert!(tokenize_arguments("").is_empty());
    }

    #[test]
    fn test_argument_precedence() {
        assert_eq!(resolve_shell_arguments(Some("-i"), Some("-l"), Some("--login")), "-i");
        assert_eq!(resolve_shell_arguments(None, Some("-l"), Some("--login")), "-l");
        assert_eq!(resolve_shell_arguments(None, None, Some("--login")), "--login");
        assert_eq!(resolve_shell_arguments(None, None, None), "");
        // An empty override is still an override
        assert_eq!(resolve_shell_arguments(Some(""), Some("-l"), None), "");
    }

    #[test]
    fn test_environment_sanitization() {
        let env = env(&[("NODE_ENV", "production"), ("PATH", "/bin")]);
        let sanitized = resolve_environment(&env, &["NODE_ENV".to_string()]);
        assert_eq!(sanitized.get("PATH").map(String::as_str), Some("/bin"));
        assert!(!sanitized.contains_key("NODE_ENV"));
        // The input is untouched
        assert!(env.contains_key("NODE_ENV"));
    }

    #[test]
    fn test_login_args_only_for_os_shell() {
        let settings = ShellSettings {
            login_args: Some("--login".to_string()),
            ..ShellSettings::default()
        };
        let env = env(&[(SHELL_VAR, "/bin/bash"), ("HOME", "/")]);
        let host = StaticHost::default();
        let resolver = ConfigResolver::new(&settings, &env, &host);

        let resolved = resolver.resolve(&SessionConfig::default());
        assert_eq!(resolved.shell_path, "/bin/bash");
        assert_eq!(resolved.args, vec!["--login"]);

        let resolved = resolver.resolve(&SessionConfig {
            shell_path: Some("/bin/sh".to_string()),
            ..SessionConfig::default()
        });
        assert!(resolved.args.is_empty());

        let no_login = ShellSettings {
            login_args: None,
            ..ShellSettings::default()
        };
        let resolved = ConfigResolver::new(&no_login, &env, &host).resolve(&SessionConfig::default());
        assert!(resolved.args.is_empty());
    }

    #[test]
    fn test_login_args_skip_other_os_shells() {
        let settings = ShellSettings {
            login_args: Some("--login".to_string()),
            ..ShellSettings::default()
        };
        let host = StaticHost::default();
        for shell in ["/bin/sh", "/bin/dash", "/usr/bin/tcsh", "/bin/ksh"] {
            let os_env = env(&[(SHELL_VAR, shell), ("HOME", "/")]);
            for settings in [&settings, &ShellSettings::default()] {
                let resolved = ConfigResolver::new(settings, &os_env, &host).resolve(&SessionConfig::default());
                assert_eq!(resolved.shell_path, shell);
                assert!(resolved.args.is_empty(), "{shell}: {:?}", resolved.args);
                assert_eq!(resolved.shell_arguments, "");
            }
        }

        // bash anywhere on disk still gets the flag
        let bash_env = env(&[(SHELL_VAR, "/usr/local/bin/bash"), ("HOME", "/")]);
        let resolved = ConfigResolver::new(&settings, &bash_env, &host).resolve(&SessionConfig::default());
        assert_eq!(resolved.args, vec!["--login"]);

        // The list is configurable
        let zsh = ShellSettings {
            login_shells: vec!["zsh".to_string()],
            ..settings.clone()
        };
        let zsh_env = env(&[(SHELL_VAR, "/bin/zsh"), ("HOME", "/")]);
        let resolved = ConfigResolver::new(&zsh, &zsh_env, &host).resolve(&SessionConfig::default());
        assert_eq!(resolved.args, vec!["--login"]);
    }

    #[test]
    fn test_is_login_shell() {
        let shells = vec!["bash".to_string()];
        assert!(is_login_shell("/bin/bash", &shells));
        assert!(is_login_shell("bash", &shells));
        assert!(!is_login_shell("/bin/sh", &shells));
        assert!(!is_login_shell("/opt/bash/bin/zsh", &shells));
        assert!(!is_login_shell("", &shells));
    }

    #[test]
    fn test_exclusions_override_replaces_global() {
        let settings = ShellSettings::default();
        let env = env(&[("NODE_ENV", "test"), ("FOO", "1"), ("HOME", "/")]);
        let host = StaticHost::default();
        let resolver = ConfigResolver::new(&settings, &env, &host);

        let resolved = resolver.resolve(&SessionConfig::default());
        assert_eq!(resolved.environment_exclusions, vec!["NODE_ENV"]);
        assert!(!resolved.environment.contains_key("NODE_ENV"));

        let resolved = resolver.resolve(&SessionConfig {
            sanitize_environment: Some(vec!["FOO".to_string()]),
            ..SessionConfig::default()
        });
        assert!(resolved.environment.contains_key("NODE_ENV"));
        assert!(!resolved.environment.contains_key("FOO"));
    }

    #[test]
    fn test_working_directory_override_is_verbatim() {
        let host = StaticHost::new(vec![PathBuf::from("/somewhere")]);
        let dir = resolve_working_directory(Some(Path::new("/tmp")), &host, &EnvMap::new());
        assert_eq!(dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_working_directory_prefers_active_project() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let host = StaticHost {
            active_document: Some(second.path().join("src").join("main.rs")),
            project_roots: vec![first.path().to_path_buf(), second.path().to_path_buf()],
        };
        let dir = resolve_working_directory(None, &host, &EnvMap::new());
        assert_eq!(dir, second.path().canonicalize().unwrap());

        // A document outside every project falls back to the first root
        let host = StaticHost {
            active_document: Some(PathBuf::from("/elsewhere/notes.txt")),
            ..host
        };
        let dir = resolve_working_directory(None, &host, &EnvMap::new());
        assert_eq!(dir, first.path().canonicalize().unwrap());
    }

    #[test]
    fn test_working_directory_falls_back_to_home() {
        let home = tempfile::tempdir().unwrap();
        let env = env(&[("HOME", home.path().to_str().unwrap())]);
        let dir = resolve_working_directory(None, &StaticHost::default(), &env);
        assert_eq!(dir, home.path().canonicalize().unwrap());
        assert!(dir.is_absolute());
    }

    #[test]
    fn test_empty_shell_path_fails_validation() {
        let resolved = ResolvedConfig {
            shell_path: String::new(),
            shell_arguments: String::new(),
            args: Vec::new(),
            environment_exclusions: Vec::new(),
            environment: EnvMap::new(),
            working_directory: PathBuf::from("/"),
        };
        assert_eq!(resolved.validate(), Err(ConfigResolutionError::EmptyShellPath));
    }
}
