//! GPG commit signing for shell workspaces.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::error::{GitError, GitResult};
use super::shell::ShellExecutor;

/// Private key material used to sign cherry-pick commits.
#[derive(Clone)]
pub struct SigningConfig {
    key: String,
    passphrase: Option<String>,
}

impl SigningConfig {
    /// `key` is an ASCII-armored (or binary) secret key export.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        let passphrase = passphrase.into();
        self.passphrase = (!passphrase.is_empty()).then_some(passphrase);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.key.trim().is_empty()
    }
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("key", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Import the key into a private GnuPG home under `git_dir` and return that
/// home together with the long key id.
pub(crate) async fn import_key(
    executor: &ShellExecutor,
    git_dir: &Path,
    config: &SigningConfig,
) -> GitResult<(PathBuf, String)> {
    let home = git_dir.join("gnupg");
    create_private_dir(&home)?;
    let home_arg = home.to_string_lossy().into_owned();

    let key_file = home.join("signing.key");
    write_private_file(&key_file, config.key.trim())?;
    let passphrase_file = match &config.passphrase {
        Some(passphrase) => {
            let path = home.join("signing.pass");
            write_private_file(&path, passphrase)?;
            Some(path)
        }
        None => None,
    };

    let mut import = vec!["--homedir".to_string(), home_arg.clone(), "--batch".to_string()];
    if let Some(path) = &passphrase_file {
        import.extend([
            "--pinentry-mode".to_string(),
            "loopback".to_string(),
            "--passphrase-file".to_string(),
            path.to_string_lossy().into_owned(),
        ]);
    }
    import.extend(["--import".to_string(), key_file.to_string_lossy().into_owned()]);

    let imported = executor.run_tool("gpg", &import).await;
    for path in std::iter::once(&key_file).chain(passphrase_file.as_ref()) {
        if let Err(err) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "failed to remove signing material");
        }
    }
    imported.map_err(|err| GitError::step("gpg import key", err))?;

    let listing = executor
        .run_tool(
            "gpg",
            &[
                "--homedir".to_string(),
                home_arg,
                "--list-secret-keys".to_string(),
                "--keyid-format=long".to_string(),
            ],
        )
        .await
        .map_err(|err| GitError::step("gpg list keys", err))?;

    let key_id = extract_key_id(&listing)
        .ok_or_else(|| GitError::Signing("could not extract key id from gpg output".to_string()))?;
    Ok((home, key_id.to_string()))
}

/// Find the long key id in `gpg --list-secret-keys --keyid-format=long` output,
/// e.g. `sec   rsa4096/ABCD1234EFGH5678 2024-01-01 [SC]`.
pub(crate) fn extract_key_id(listing: &str) -> Option<&str> {
    listing
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            line.starts_with("sec") || line.starts_with("ssb")
        })
        .flat_map(str::split_whitespace)
        .filter_map(|field| field.split_once('/'))
        .find(|(_, id)| id.len() >= 8 && !id.contains('/'))
        .map(|(_, id)| id)
}

fn create_private_dir(path: &Path) -> GitResult<()> {
    std::fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn write_private_file(path: &Path, contents: &str) -> GitResult<()> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
