//! High level entry point: one SFTP session, any number of sync passes

use tracing::info;

use crate::config::ConnectionConfig;
use crate::engine::{Direction, SyncEngine, SyncOptions, SyncRequest};
use crate::error::Result;
use crate::fs::{DirectoryFilesystem, LocalFs, SftpFs};
use crate::stats::TransferStats;

/// A connected mirroring client
pub struct SftpSync {
    remote: SftpFs,
    local: LocalFs,
}

impl SftpSync {
    /// Open the session described by `config`
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let remote = SftpFs::connect(config).await?;
        Ok(Self {
            remote,
            local: LocalFs::new(),
        })
    }

    /// Mirror `source` onto `destination`.
    ///
    /// With `download` set the source is remote and the destination local,
    /// otherwise the other way round.
    #[allow(clippy::too_many_arguments)]
    pub async fn sync(
        &self,
        source: &str,
        destination: &str,
        download: bool,
        includes: &[String],
        excludes: &[String],
        delete: bool,
        dry: bool,
    ) -> Result<TransferStats> {
        let direction = if download {
            Direction::Download
        } else {
            Direction::Upload
        };
        let request = SyncRequest::new(source, destination, direction).with_options(SyncOptions {
            includes: includes.to_vec(),
            excludes: excludes.to_vec(),
            delete,
            dry_run: dry,
        });
        self.run(&request).await
    }

    /// Run a prepared request
    pub async fn run(&self, request: &SyncRequest) -> Result<TransferStats> {
        let (source, destination) = self.sides(request.direction);
        let stats = SyncEngine::new(source, destination).sync(request).await?;
        info!("{}", stats.summary());
        Ok(stats)
    }

    pub async fn close(self) -> Result<()> {
        self.remote.close().await
    }

    fn sides(&self, direction: Direction) -> (&dyn DirectoryFilesystem, &dyn DirectoryFilesystem) {
        match direction {
            Direction::Upload => (&self.local, &self.remote),
            Direction::Download => (&self.remote, &self.local),
        }
    }
}
