use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CACHE_VERSION: u32 = 1;

/// Treat tokens this close to expiry as already expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Cached mailbox credential, stored as JSON in the configured token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub version: u32,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at_epoch: Option<i64>, // epoch seconds
}

impl Credential {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_at: Option<i64>) -> Self {
        Self {
            version: CACHE_VERSION,
            access_token,
            refresh_token,
            expires_at_epoch: expires_at,
        }
    }

    /// Usable without a refresh. A token without a known expiry is never trusted.
    pub fn is_valid(&self, now: i64) -> bool {
        match self.expires_at_epoch {
            Some(exp) => !self.access_token.is_empty() && now + EXPIRY_MARGIN_SECS < exp,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Load the cached credential if present.
pub fn load_credential(path: &Path) -> Result<Option<Credential>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading token cache {}", path.display()))?;
    let cred: Credential = serde_json::from_str(&s)
        .with_context(|| format!("parsing token cache {}", path.display()))?;
    if cred.version != CACHE_VERSION {
        bail!(
            "token cache {} has unsupported version {}",
            path.display(),
            cred.version
        );
    }
    Ok(Some(cred))
}

/// Write the credential through a temporary sibling file, then rename over the cache.
pub fn save_credential(path: &Path, cred: &Credential) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    {
        let file = File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut w, cred)?;
        w.flush()?;
        w.get_ref().sync_all()?;
    }
    restrict_permissions(&tmp)?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// `token.json` -> `token.json.tmp`, never the cache path itself.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
