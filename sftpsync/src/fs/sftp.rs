//! Remote side of a sync over SFTP

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use russh::client::{self, AuthResult, Handle, Handler};
use russh::keys::{HashAlg, PublicKey};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{Result, SyncError};
use crate::fs::{
    copy_file, unix_seconds, DirEntry, DirectoryFilesystem, EntryKind, FileMeta, FileReader,
    FileWriter, LocalFs, StatResult, WalkLayout,
};
use crate::paths::ancestors;

/// Host key policy for a session
pub(crate) struct HostKeyCheck {
    /// OpenSSH style SHA-256 fingerprints; `None` accepts any key
    allowed_fingerprints: Option<Vec<String>>,
}

impl Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        match &self.allowed_fingerprints {
            Some(allowed) => {
                let ok = allowed.iter().any(|fp| fp == &fingerprint);
                if !ok {
                    warn!("server key {} is not in the allowed list", fingerprint);
                }
                Ok(ok)
            }
            None => {
                debug!("accepting server key {}", fingerprint);
                Ok(true)
            }
        }
    }
}

/// An SFTP session used as a sync source or destination
pub struct SftpFs {
    sftp: SftpSession,
    session: Handle<HostKeyCheck>,
    host: String,
    username: String,
}

/// Why one connection attempt failed
enum AttemptError {
    /// Rejected credentials or host key; retrying will not help
    Authentication(String),
    Timeout,
    Other(String),
}

impl SftpFs {
    /// Connect, authenticate and open the `sftp` subsystem.
    ///
    /// Authentication failures and timeouts end the attempt loop at once;
    /// any other failure is retried up to `max_attempts` times.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let mut attempt = 1;
        loop {
            let outcome = tokio::time::timeout(config.timeout, Self::attempt(config)).await;
            let error = match outcome {
                Ok(Ok(fs)) => {
                    info!("connected to {}@{}:{}", config.username, config.host, config.port);
                    return Ok(fs);
                }
                Ok(Err(error)) => error,
                Err(_) => AttemptError::Timeout,
            };

            match error {
                AttemptError::Authentication(message) => {
                    return Err(SyncError::Authentication {
                        host: config.host.clone(),
                        username: config.username.clone(),
                        message,
                    });
                }
                AttemptError::Timeout => {
                    return Err(SyncError::Timeout {
                        host: config.host.clone(),
                        message: format!("no session after {:?}", config.timeout),
                    });
                }
                AttemptError::Other(message) if attempt >= config.max_attempts => {
                    return Err(SyncError::Transport {
                        host: config.host.clone(),
                        message,
                    });
                }
                AttemptError::Other(message) => {
                    warn!(
                        "connection attempt {}/{} to {} failed: {}",
                        attempt, config.max_attempts, config.host, message
                    );
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(config: &ConnectionConfig) -> std::result::Result<Self, AttemptError> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            ..Default::default()
        });
        let handler = HostKeyCheck {
            allowed_fingerprints: config.allowed_fingerprints.clone(),
        };

        let mut session = client::connect(ssh_config, (config.host.as_str(), config.port), handler)
            .await
            .map_err(classify)?;

        let auth = session
            .authenticate_password(
                config.username.clone(),
                config.password.clone().unwrap_or_default(),
            )
            .await
            .map_err(classify)?;
        if let AuthResult::Failure {
            remaining_methods,
            partial_success,
        } = auth
        {
            return Err(AttemptError::Authentication(format!(
                "password rejected (remaining methods: {:?}, partial success: {})",
                remaining_methods, partial_success
            )));
        }

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| AttemptError::Other(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| AttemptError::Other(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| AttemptError::Other(e.to_string()))?;

        Ok(Self {
            sftp,
            session,
            host: config.host.clone(),
            username: config.username.clone(),
        })
    }

    /// Close the SFTP channel and the SSH session
    pub async fn close(self) -> Result<()> {
        self.sftp
            .close()
            .await
            .map_err(|e| SyncError::remote_error("/", e))?;
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| SyncError::Transport {
                host: self.host.clone(),
                message: e.to_string(),
            })
    }

    /// Copy one local file to the server
    pub async fn upload(&self, local: &str, remote: &str) -> Result<u64> {
        copy_file(&LocalFs, local, self, remote).await
    }

    /// Copy one remote file to the local filesystem
    pub async fn download(&self, remote: &str, local: &str) -> Result<u64> {
        copy_file(self, remote, &LocalFs, local).await
    }
}

fn classify(error: russh::Error) -> AttemptError {
    match error {
        russh::Error::UnknownKey | russh::Error::NotAuthenticated => {
            AttemptError::Authentication(error.to_string())
        }
        russh::Error::ConnectionTimeout | russh::Error::InactivityTimeout => AttemptError::Timeout,
        other => AttemptError::Other(other.to_string()),
    }
}

impl From<&FileAttributes> for FileMeta {
    fn from(attrs: &FileAttributes) -> Self {
        let time = |secs: Option<u32>| {
            secs.map(|s| UNIX_EPOCH + Duration::from_secs(u64::from(s)))
                .unwrap_or(UNIX_EPOCH)
        };
        Self {
            kind: if attrs.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: attrs.size.unwrap_or(0),
            modified: time(attrs.mtime),
            accessed: time(attrs.atime),
        }
    }
}

fn to_u32(time: SystemTime) -> u32 {
    u32::try_from(unix_seconds(time)).unwrap_or(u32::MAX)
}

#[async_trait]
impl DirectoryFilesystem for SftpFs {
    fn layout(&self) -> WalkLayout {
        WalkLayout::Interleaved
    }

    fn display_path(&self, path: &str) -> String {
        format!("{}@{}:{}", self.username, self.host, path)
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| SyncError::remote_error(path, e))?;
        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| DirEntry {
                meta: FileMeta::from(&entry.metadata()),
                is_symlink: entry.file_type().is_symlink(),
                name: entry.file_name(),
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> StatResult {
        match self.sftp.symlink_metadata(path).await {
            Ok(attrs) => StatResult::Found(FileMeta::from(&attrs)),
            Err(e) => {
                debug!("stat {} failed: {}", self.display_path(path), e);
                StatResult::NotFound
            }
        }
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        for dir in ancestors(path) {
            match self.stat(&dir).await {
                StatResult::Found(meta) if meta.is_dir() => continue,
                StatResult::Found(_) => {
                    return Err(SyncError::path_error(dir, "path component is a file"));
                }
                StatResult::NotFound => {
                    debug!("mkdir {}", self.display_path(&dir));
                    self.sftp
                        .create_dir(dir.as_str())
                        .await
                        .map_err(|e| SyncError::path_error(dir.as_str(), e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| SyncError::deletion_error(path, e.to_string()))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| SyncError::deletion_error(path, e.to_string()))
    }

    async fn open_read(&self, path: &str) -> Result<FileReader> {
        let file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| SyncError::remote_error(path, e))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str) -> Result<FileWriter> {
        let file = self
            .sftp
            .create(path)
            .await
            .map_err(|e| SyncError::remote_error(path, e))?;
        Ok(Box::new(file))
    }

    async fn set_times(
        &self,
        path: &str,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> Result<()> {
        let mut attrs = FileAttributes::empty();
        attrs.atime = Some(to_u32(accessed));
        attrs.mtime = Some(to_u32(modified));
        self.sftp
            .set_metadata(path, attrs)
            .await
            .map_err(|e| SyncError::remote_error(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_to_meta() {
        let mut attrs = FileAttributes::empty();
        attrs.size = Some(42);
        attrs.mtime = Some(1_700_000_000);
        attrs.atime = Some(1_700_000_100);

        let meta = FileMeta::from(&attrs);
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.size, 42);
        assert_eq!(unix_seconds(meta.modified), 1_700_000_000);
        assert_eq!(unix_seconds(meta.accessed), 1_700_000_100);
    }

    #[test]
    fn test_missing_times_fall_back_to_epoch() {
        let meta = FileMeta::from(&FileAttributes::empty());
        assert_eq!(meta.modified, UNIX_EPOCH);
        assert_eq!(meta.size, 0);
    }

    #[test]
    fn test_time_conversion_saturates() {
        let far_future = UNIX_EPOCH + Duration::from_secs(u64::from(u32::MAX) + 10);
        assert_eq!(to_u32(far_future), u32::MAX);
        assert_eq!(to_u32(UNIX_EPOCH + Duration::from_secs(5)), 5);
    }

    #[test]
    fn test_classify_unknown_key_as_authentication() {
        assert!(matches!(
            classify(russh::Error::UnknownKey),
            AttemptError::Authentication(_)
        ));
        assert!(matches!(
            classify(russh::Error::ConnectionTimeout),
            AttemptError::Timeout
        ));
        assert!(matches!(
            classify(russh::Error::Disconnect),
            AttemptError::Other(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried_then_transport() {
        // Port 1 on loopback is closed on any sane test host
        let mut config = ConnectionConfig::new("127.0.0.1", "nobody");
        config.port = 1;
        config.max_attempts = 2;
        config.timeout = Duration::from_secs(5);

        match SftpFs::connect(&config).await {
            Err(SyncError::Transport { host, .. }) => assert_eq!(host, "127.0.0.1"),
            Err(other) => panic!("expected a transport error, got {}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_connecting() {
        let config = ConnectionConfig::new("", "nobody");
        assert!(matches!(
            SftpFs::connect(&config).await,
            Err(SyncError::Config(_))
        ));
    }
}
