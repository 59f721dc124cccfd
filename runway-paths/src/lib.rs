//! XDG Base Directory paths for runway.
//!
//! The deployment registry, detached bundles and PID files live under the
//! state directory; user configuration lives under the config directory.
//! XDG paths are used on every platform so the layout matches tools like
//! gh, docker and kubectl.

use std::path::PathBuf;

/// Get the runway config directory.
///
/// Returns `$XDG_CONFIG_HOME/runway` if set, otherwise `~/.config/runway`.
///
/// # Examples
///
/// ```
/// use runway_paths::config_dir;
///
/// let config = config_dir();
/// let file = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Get the runway state directory.
///
/// Returns `$XDG_STATE_HOME/runway` if set, otherwise `~/.local/state/runway`.
/// This is where `deployments.json`, its backups and detached bundles live.
///
/// # Examples
///
/// ```
/// use runway_paths::state_dir;
///
/// let state = state_dir();
/// let registry = state.join("deployments.json");
/// ```
pub fn state_dir() -> PathBuf {
    xdg_dir("XDG_STATE_HOME", ".local/state")
}

/// Directory holding one sub-directory per detached deployment bundle.
pub fn bundles_dir() -> PathBuf {
    state_dir().join("bundles")
}

fn xdg_dir(env_var: &str, home_relative: &str) -> PathBuf {
    if let Ok(base) = std::env::var(env_var)
        && !base.is_empty()
    {
        PathBuf::from(base).join("runway")
    } else if let Some(home) = dirs::home_dir() {
        home.join(home_relative).join("runway")
    } else {
        PathBuf::from(home_relative).join("runway")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir_ends_with_runway() {
        let path = config_dir();
        assert!(
            path.ends_with("runway"),
            "config_dir should end with 'runway'"
        );
    }

    #[test]
    #[serial]
    fn test_state_dir_ends_with_runway() {
        let path = state_dir();
        assert!(path.ends_with("runway"), "state_dir should end with 'runway'");
    }

    #[test]
    #[serial]
    fn test_config_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-config");
        }
        let path = config_dir();
        assert_eq!(path, PathBuf::from("/tmp/test-config/runway"));
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }

    #[test]
    #[serial]
    fn test_state_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_STATE_HOME", "/tmp/test-state");
        }
        assert_eq!(state_dir(), PathBuf::from("/tmp/test-state/runway"));
        assert_eq!(
            bundles_dir(),
            PathBuf::from("/tmp/test-state/runway/bundles")
        );
        unsafe {
            std::env::remove_var("XDG_STATE_HOME");
        }
    }

    #[test]
    #[serial]
    fn test_empty_xdg_env_falls_back_to_home() {
        unsafe {
            std::env::set_var("XDG_STATE_HOME", "");
        }
        let path = state_dir();
        assert!(path.ends_with(".local/state/runway"));
        unsafe {
            std::env::remove_var("XDG_STATE_HOME");
        }
    }
}
