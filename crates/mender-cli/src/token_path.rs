use std::env::VarError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::ConfigError;

const LEGACY_DIR: &str = ".mender";
const CACHE_SUBDIR: &str = "mender";
const TOKEN_FILE: &str = "authtoken";

/// What happened to a token found at the legacy location.
#[derive(Debug)]
pub enum Migration {
    /// The legacy token was moved to the canonical path.
    Migrated,
    /// A token already exists at the canonical path; nothing was touched.
    AlreadyPresent,
    /// No legacy token exists.
    NothingToMigrate,
    /// Creating the canonical directory or renaming the file failed.
    Failed(io::Error),
}

/// Resolve the canonical token path from the process environment,
/// migrating a legacy token as a side effect.
pub fn default_token_path() -> Result<PathBuf, ConfigError> {
    resolve_token_path_with(|k| std::env::var(k), dirs::home_dir)
}

fn resolve_token_path_with(
    env_var: impl Fn(&str) -> Result<String, VarError>,
    user_home: impl FnOnce() -> Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir_with(&env_var, user_home)?;
    let cache = resolve_cache_dir_with(&env_var, &home);

    let legacy = home.join(LEGACY_DIR).join(TOKEN_FILE);
    let token = cache.join(CACHE_SUBDIR).join(TOKEN_FILE);
    migrate_token(&legacy, &token);

    Ok(token)
}

/// `$HOME` when set and non-empty, otherwise the current user's record.
fn resolve_home_dir_with(
    env_var: impl Fn(&str) -> Result<String, VarError>,
    user_home: impl FnOnce() -> Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(home) = non_empty(&env_var, "HOME") {
        return Ok(PathBuf::from(home));
    }
    user_home()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(ConfigError::HomeDirUnavailable)
}

fn resolve_cache_dir_with(
    env_var: impl Fn(&str) -> Result<String, VarError>,
    home: &Path,
) -> PathBuf {
    match non_empty(&env_var, "XDG_CACHE_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => home.join(".cache"),
    }
}

fn non_empty(env_var: impl Fn(&str) -> Result<String, VarError>, key: &str) -> Option<String> {
    env_var(key).ok().filter(|v| !v.is_empty())
}

/// Move `legacy` to `token` unless `token` already exists. Failures are
/// logged and reported in the returned value, never raised.
pub fn migrate_token(legacy: &Path, token: &Path) -> Migration {
    match fs::metadata(token) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        _ => {
            debug!(path = %token.display(), "auth token already at canonical location");
            return Migration::AlreadyPresent;
        }
    }

    if fs::metadata(legacy).is_err() {
        debug!(path = %legacy.display(), "no legacy auth token to migrate");
        return Migration::NothingToMigrate;
    }

    let moved = match token.parent() {
        Some(dir) => create_private_dir(dir),
        None => Ok(()),
    }
    .and_then(|()| fs::rename(legacy, token));

    if let Some(legacy_dir) = legacy.parent()
        && let Err(err) = fs::remove_dir(legacy_dir)
    {
        debug!(path = %legacy_dir.display(), error = %err, "legacy token directory left in place");
    }

    match moved {
        Ok(()) => {
            info!(
                from = %legacy.display(),
                to = %token.display(),
                "migrated auth token"
            );
            Migration::Migrated
        }
        Err(err) => {
            warn!(
                from = %legacy.display(),
                to = %token.display(),
                error = %err,
                "failed to migrate auth token; log in again if requests are rejected"
            );
            Migration::Failed(err)
        }
    }
}

/// Create `dir` and any missing ancestors, readable only by the owner.
#[cfg(unix)]
pub(crate) fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
pub(crate) fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Result<String, VarError> {
        Err(VarError::NotPresent)
    }

    fn env_with<'a>(
        vars: &'a [(&'a str, &'a str)],
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    // -- home / cache resolution --

    #[test]
    fn home_env_wins_without_user_lookup() {
        let env = env_with(&[("HOME", "/h")]);
        let home = resolve_home_dir_with(env, || panic!("user lookup must not run")).unwrap();
        assert_eq!(home, PathBuf::from("/h"));
    }

    #[test]
    fn empty_home_falls_back_to_user_record() {
        let env = env_with(&[("HOME", "")]);
        let home = resolve_home_dir_with(env, || Some(PathBuf::from("/from/passwd"))).unwrap();
        assert_eq!(home, PathBuf::from("/from/passwd"));
    }

    #[test]
    fn missing_home_everywhere_is_config_error() {
        let err = resolve_token_path_with(no_env, || None).unwrap_err();
        assert!(matches!(err, ConfigError::HomeDirUnavailable));
        assert!(err.to_string().contains("$HOME"));
    }

    #[test]
    fn xdg_cache_home_overrides_default() {
        let env = env_with(&[("XDG_CACHE_HOME", "/x"), ("HOME", "/h")]);
        assert_eq!(resolve_cache_dir_with(env, Path::new("/h")), PathBuf::from("/x"));
    }

    #[test]
    fn cache_dir_defaults_under_home() {
        let env = env_with(&[("HOME", "/h")]);
        assert_eq!(
            resolve_cache_dir_with(env, Path::new("/h")),
            PathBuf::from("/h/.cache")
        );
    }

    #[test]
    fn empty_xdg_cache_home_is_ignored() {
        let env = env_with(&[("XDG_CACHE_HOME", "")]);
        assert_eq!(
            resolve_cache_dir_with(env, Path::new("/h")),
            PathBuf::from("/h/.cache")
        );
    }

    // -- migration --

    #[test]
    fn migrates_then_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let legacy = tmp.path().join("home/.mender/authtoken");
        let token = tmp.path().join("cache/mender/authtoken");
        write(&legacy, "tok");

        assert!(matches!(migrate_token(&legacy, &token), Migration::Migrated));
        assert_eq!(fs::read_to_string(&token).unwrap(), "tok");
        assert!(!legacy.exists());
        assert!(!legacy.parent().unwrap().exists());

        assert!(matches!(
            migrate_token(&legacy, &token),
            Migration::AlreadyPresent
        ));
        assert_eq!(fs::read_to_string(&token).unwrap(), "tok");
    }

    #[test]
    fn does_not_overwrite_existing_token() {
        let tmp = tempfile::tempdir().unwrap();
        let legacy = tmp.path().join("home/.mender/authtoken");
        let token = tmp.path().join("cache/mender/authtoken");
        write(&legacy, "old");
        write(&token, "new");

        assert!(matches!(
            migrate_token(&legacy, &token),
            Migration::AlreadyPresent
        ));
        assert_eq!(fs::read_to_string(&legacy).unwrap(), "old");
        assert_eq!(fs::read_to_string(&token).unwrap(), "new");
    }

    #[test]
    fn nothing_to_migrate_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let legacy = tmp.path().join("home/.mender/authtoken");
        let token = tmp.path().join("cache/mender/authtoken");

        assert!(matches!(
            migrate_token(&legacy, &token),
            Migration::NothingToMigrate
        ));
        assert!(!tmp.path().join("cache").exists());
        assert!(!tmp.path().join("home").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_directory_creation_keeps_legacy_token() {
        let tmp = tempfile::tempdir().unwrap();
        let legacy = tmp.path().join("home/.mender/authtoken");
        write(&legacy, "tok");
        // Dangling link: the token stats as missing but its directory cannot be created.
        let cache = tmp.path().join("cache");
        std::os::unix::fs::symlink(tmp.path().join("nowhere"), &cache).unwrap();
        let token = cache.join("mender/authtoken");

        assert!(matches!(
            migrate_token(&legacy, &token),
            Migration::Failed(_)
        ));
        assert_eq!(fs::read_to_string(&legacy).unwrap(), "tok");
        assert!(legacy.parent().unwrap().is_dir());
        assert!(!tmp.path().join("nowhere").exists());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_canonical_path_counts_as_present() {
        let tmp = tempfile::tempdir().unwrap();
        let legacy = tmp.path().join("home/.mender/authtoken");
        write(&legacy, "tok");
        // A regular file where the cache directory should be.
        let blocker = tmp.path().join("cache");
        fs::write(&blocker, "").unwrap();
        let token = blocker.join("mender/authtoken");

        assert!(matches!(
            migrate_token(&legacy, &token),
            Migration::AlreadyPresent
        ));
        assert_eq!(fs::read_to_string(&legacy).unwrap(), "tok");
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "");
    }

    #[cfg(unix)]
    #[test]
    fn canonical_directory_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let legacy = tmp.path().join("home/.mender/authtoken");
        let token = tmp.path().join("cache/mender/authtoken");
        write(&legacy, "tok");

        migrate_token(&legacy, &token);
        let mode = fs::metadata(token.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    // -- end to end --

    #[test]
    fn resolves_and_migrates_from_home() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("home/u");
        let home_str = home.to_str().unwrap().to_string();
        write(&home.join(".mender/authtoken"), "secret");

        let vars = [("HOME", home_str.as_str())];
        let path = resolve_token_path_with(env_with(&vars), || None).unwrap();

        assert_eq!(path, home.join(".cache/mender/authtoken"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "secret");
        assert!(!home.join(".mender/authtoken").exists());
    }

    #[test]
    fn non_empty_legacy_dir_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("home/u");
        let home_str = home.to_str().unwrap().to_string();
        write(&home.join(".mender/authtoken"), "secret");
        write(&home.join(".mender/other"), "keep");

        let vars = [("HOME", home_str.as_str())];
        let path = resolve_token_path_with(env_with(&vars), || None).unwrap();

        assert_eq!(path, home.join(".cache/mender/authtoken"));
        assert_eq!(fs::read_to_string(home.join(".mender/other")).unwrap(), "keep");
        assert!(!home.join(".mender/authtoken").exists());
    }

    #[test]
    fn xdg_cache_home_receives_migrated_token() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("home");
        let cache = tmp.path().join("xdg");
        let home_str = home.to_str().unwrap().to_string();
        let cache_str = cache.to_str().unwrap().to_string();
        write(&home.join(".mender/authtoken"), "secret");

        let vars = [("HOME", home_str.as_str()), ("XDG_CACHE_HOME", cache_str.as_str())];
        let path = resolve_token_path_with(env_with(&vars), || None).unwrap();

        assert_eq!(path, cache.join("mender/authtoken"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "secret");
    }
}
