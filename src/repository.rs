use tracing::{debug, info};

use crate::error::{Result, VaultError};
use crate::service::BackupService;

impl BackupService {
    /// Makes sure a repository session exists, creating the repository on
    /// first use. A no-op while the current session is still valid.
    pub fn ensure_connected(&self) -> Result<()> {
        let record = self.shared.read();
        let backend = match record.config.validate() {
            Ok(backend) => backend,
            Err(err) => {
                self.shared.update(|r| {
                    r.state.repository_connected = false;
                    r.state.last_status = format!("Backend configuration invalid: {}", err);
                });
                return Err(err);
            }
        };
        if record.state.repository_connected {
            debug!("repository already connected");
            return Ok(());
        }

        if let Err(err) = self.ensure_cache_dataset() {
            self.shared.update(|r| {
                r.state.repository_connected = false;
                r.state.last_status = format!("Failed to prepare cache dataset: {}", err);
            });
            return Err(err);
        }

        let password = record.config.repository_password.as_str();
        let engine = self.deps.engine.as_ref();
        let connected = engine.connect_repository(&backend, password).or_else(|connect_err| {
            info!(error = %connect_err, "repository not found, creating new one");
            engine
                .create_repository(&backend, password)
                .and_then(|_| engine.connect_repository(&backend, password))
                .map_err(|create_err| {
                    VaultError::RepositoryUnavailable(format!(
                        "connect: {}; create: {}",
                        connect_err, create_err
                    ))
                })
        });

        match connected {
            Ok(()) => {
                info!("repository connected");
                self.shared.update(|r| {
                    r.state.repository_connected = true;
                    r.state.last_status = "Repository connected".to_string();
                });
                Ok(())
            }
            Err(err) => {
                self.shared.update(|r| {
                    r.state.repository_connected = false;
                    r.state.last_status =
                        format!("Failed to connect or initialize repository: {}", err);
                });
                Err(err)
            }
        }
    }

    /// The engine cache lives on a child dataset, outside pool snapshots.
    fn ensure_cache_dataset(&self) -> Result<()> {
        let pool = self.deps.pool.as_ref();
        let dataset = format!("{}/{}", self.settings.pool, self.settings.cache_dataset);
        if pool.dataset_exists(&dataset) {
            debug!(dataset = %dataset, "cache dataset already exists");
            return Ok(());
        }
        let mountpoint = self.settings.cache_dir.to_string_lossy().to_string();
        info!(dataset = %dataset, mountpoint = %mountpoint, "creating cache dataset");
        pool.create_dataset(
            &self.settings.pool,
            &self.settings.cache_dataset,
            &[("mountpoint", mountpoint.as_str()), ("canmount", "on")],
        )
    }
}
