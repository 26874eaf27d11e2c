use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;

/// An ephemeral git credential helper scoped to one subprocess invocation.
///
/// Materialises a 0700 script inside a private 0700 temp directory. The
/// script answers git's credential prompt with `username=x-access-token` and
/// the token; git is pointed at it through `GIT_CONFIG` environment slots, so
/// the token never appears on a command line or in the gateway's own
/// environment. The directory is removed when the helper is dropped, on
/// success, error, timeout, and unwind alike.
pub struct CredentialHelper {
    dir: TempDir,
    script: PathBuf,
}

impl std::fmt::Debug for CredentialHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // File name only; never the script body.
        f.debug_struct("CredentialHelper")
            .field(
                "script",
                &self.script.file_name().unwrap_or_default(),
            )
            .finish()
    }
}

impl CredentialHelper {
    pub fn new(token: &SecretString) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("jib-cred-")
            .tempdir()?;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;

        let script = dir.path().join("credential-helper.sh");
        {
            let mut file = std::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .mode(0o700)
                .open(&script)?;
            write!(
                file,
                "#!/bin/sh\necho username=x-access-token\necho password={}\n",
                token.expose_secret()
            )?;
        }

        Ok(Self { dir, script })
    }

    pub fn script_path(&self) -> &Path {
        &self.script
    }

    /// Environment entries that point git at this helper.
    ///
    /// Two config slots: the helper itself and `safe.directory=*` (worktree
    /// paths are owned by the container uid, not the gateway's).
    pub fn env(&self) -> Vec<(String, String)> {
        let script = self.script.display().to_string();
        vec![
            ("GIT_ASKPASS".to_owned(), script.clone()),
            ("GIT_CONFIG_COUNT".to_owned(), "2".to_owned()),
            ("GIT_CONFIG_KEY_0".to_owned(), "credential.helper".to_owned()),
            ("GIT_CONFIG_VALUE_0".to_owned(), script),
            ("GIT_CONFIG_KEY_1".to_owned(), "safe.directory".to_owned()),
            ("GIT_CONFIG_VALUE_1".to_owned(), "*".to_owned()),
        ]
    }

    /// The directory holding the script; exists only while `self` lives.
    pub fn dir_path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> SecretString {
        SecretString::from("ghs_testtoken123")
    }

    #[test]
    fn script_is_private_and_holds_credentials() {
        let helper = CredentialHelper::new(&token()).unwrap();

        let meta = std::fs::metadata(helper.script_path()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
        let dir_meta = std::fs::metadata(helper.dir_path()).unwrap();
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);

        let body = std::fs::read_to_string(helper.script_path()).unwrap();
        assert!(body.contains("username=x-access-token"));
        assert!(body.contains("password=ghs_testtoken123"));
    }

    #[test]
    fn env_references_helper_without_token() {
        let helper = CredentialHelper::new(&token()).unwrap();
        let env = helper.env();

        let count = env
            .iter()
            .find(|(k, _)| k == "GIT_CONFIG_COUNT")
            .map(|(_, v)| v.as_str());
        assert_eq!(count, Some("2"));
        for (_, value) in &env {
            assert!(!value.contains("ghs_testtoken123"));
        }
    }

    #[test]
    fn drop_removes_every_file() {
        let (dir, script) = {
            let helper = CredentialHelper::new(&token()).unwrap();
            (
                helper.dir_path().to_path_buf(),
                helper.script_path().to_path_buf(),
            )
        };
        assert!(!script.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn debug_output_omits_directory_and_token() {
        let helper = CredentialHelper::new(&token()).unwrap();
        let rendered = format!("{helper:?}");
        assert!(!rendered.contains("ghs_testtoken123"));
        assert!(!rendered.contains(helper.dir_path().to_str().unwrap()));
    }
}
