use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use secrecy::SecretString;

/// Environment variable that overrides the on-disk gateway secret.
pub const GATEWAY_SECRET_VAR: &str = "JIB_GATEWAY_SECRET";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("failed to read gateway secret from {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write gateway secret to {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The shared secret agent containers must present as a bearer token.
///
/// Search order: [`GATEWAY_SECRET_VAR`], then the 0600 secret file. When
/// neither exists a fresh 256-bit URL-safe secret is generated and persisted
/// at mode 0600; the gateway never rotates it on its own.
pub fn load_or_generate(secret_file: &Path) -> Result<SecretString, SecretError> {
    if let Ok(value) = std::env::var(GATEWAY_SECRET_VAR) {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(SecretString::from(value.to_owned()));
        }
    }

    if secret_file.exists() {
        let value = std::fs::read_to_string(secret_file).map_err(|source| SecretError::Read {
            path: secret_file.to_path_buf(),
            source,
        })?;
        return Ok(SecretString::from(value.trim().to_owned()));
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let secret = URL_SAFE_NO_PAD.encode(bytes);

    if let Some(parent) = secret_file.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SecretError::Write {
            path: secret_file.to_path_buf(),
            source,
        })?;
    }
    use std::io::Write as _;
    let mut file = std::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .mode(0o600)
        .open(secret_file)
        .map_err(|source| SecretError::Write {
            path: secret_file.to_path_buf(),
            source,
        })?;
    file.write_all(secret.as_bytes())
        .map_err(|source| SecretError::Write {
            path: secret_file.to_path_buf(),
            source,
        })?;

    tracing::info!(secret_file = %secret_file.display(), "generated new gateway secret");
    Ok(SecretString::from(secret))
}
