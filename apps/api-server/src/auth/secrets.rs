use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;

const KEY_BYTES: usize = 32;

/// Signing and subject-encryption keys. Both live in one key file but are
/// separate fields and never interchangeable.
#[derive(Clone)]
pub struct SecretStore {
    hmac_key: [u8; KEY_BYTES],
    subject_key: [u8; KEY_BYTES],
}

impl SecretStore {
    /// Loads the key file, generating and persisting fresh material on first
    /// start. The file holds one line of URL-safe base64 (no padding)
    /// decoding to 64 bytes: HMAC key first, AES subject key second. Writes
    /// go through a temp file + rename so a crash never leaves a partial key.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read secret file {}", path.display()))?;
            let line = raw.lines().next().unwrap_or("").trim();
            if !line.is_empty() {
                return Self::from_encoded(line);
            }
        }

        let mut material = [0u8; KEY_BYTES * 2];
        OsRng.fill_bytes(&mut material);
        let encoded = URL_SAFE_NO_PAD.encode(material);
        write_atomically(path, &encoded)?;
        Self::from_encoded(&encoded)
    }

    fn from_encoded(encoded: &str) -> Result<Self> {
        let material = URL_SAFE_NO_PAD
            .decode(encoded)
            .context("secret file is not valid base64")?;
        if material.len() != KEY_BYTES * 2 {
            bail!(
                "secret file must decode to {} bytes, got {}",
                KEY_BYTES * 2,
                material.len()
            );
        }
        let mut hmac_key = [0u8; KEY_BYTES];
        let mut subject_key = [0u8; KEY_BYTES];
        hmac_key.copy_from_slice(&material[..KEY_BYTES]);
        subject_key.copy_from_slice(&material[KEY_BYTES..]);
        Ok(Self {
            hmac_key,
            subject_key,
        })
    }

    pub fn hmac_key(&self) -> &[u8] {
        &self.hmac_key
    }

    pub fn subject_key(&self) -> &[u8; KEY_BYTES] {
        &self.subject_key
    }
}

fn write_atomically(path: &Path, encoded: &str) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut file = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir),
        None => tempfile::NamedTempFile::new_in("."),
    }
    .context("create temp key file")?;

    use std::io::Write;
    writeln!(file, "{encoded}").context("write key material")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))
            .context("restrict key file permissions")?;
    }

    file.persist(path)
        .with_context(|| format!("persist secret file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_and_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt_secret.txt");

        let first = SecretStore::load_or_generate(&path).unwrap();
        let second = SecretStore::load_or_generate(&path).unwrap();
        assert_eq!(first.hmac_key(), second.hmac_key());
        assert_eq!(first.subject_key(), second.subject_key());
        assert_ne!(first.hmac_key(), first.subject_key().as_slice());
    }

    #[test]
    fn key_file_is_one_base64_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt_secret.txt");
        SecretStore::load_or_generate(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines = raw.lines();
        let line = lines.next().unwrap();
        assert!(lines.next().is_none());
        assert_eq!(URL_SAFE_NO_PAD.decode(line).unwrap().len(), 64);
        assert!(!line.contains('='));
    }

    #[test]
    fn rejects_truncated_key_material() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt_secret.txt");
        std::fs::write(&path, URL_SAFE_NO_PAD.encode([7u8; 32])).unwrap();
        assert!(SecretStore::load_or_generate(&path).is_err());
    }
}
