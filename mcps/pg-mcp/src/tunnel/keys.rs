use std::path::Path;

use russh_keys::key::KeyPair;

use super::TunnelError;

/// Read and decode an OpenSSH or PEM private key
pub async fn load_private_key(
    path: &Path,
    passphrase: Option<&str>,
) -> Result<KeyPair, TunnelError> {
    let encoded = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TunnelError::KeyRead {
            path: path.to_path_buf(),
            source,
        })?;
    decode_private_key(&encoded, passphrase)
}

pub fn decode_private_key(encoded: &str, passphrase: Option<&str>) -> Result<KeyPair, TunnelError> {
    russh_keys::decode_secret_key(encoded, passphrase).map_err(TunnelError::KeyParse)
}
