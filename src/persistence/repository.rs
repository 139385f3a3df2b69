use super::{MappingFile, PersistenceError};
use crate::mapping::{DeviceMapping, MappingStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const APP_DIR: &str = "padmapper";
const MAPPINGS_FILE: &str = "mappings.toml";

#[derive(Debug, Clone)]
pub struct MappingRepository {
    path: PathBuf,
}

impl MappingRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Repository at `<config dir>/padmapper/mappings.toml`
    pub fn at_default_location() -> Self {
        let mut path = config_base_dir();
        path.push(APP_DIR);
        path.push(MAPPINGS_FILE);
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }

    pub async fn exists(&self) -> Result<bool, PersistenceError> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    /// Reads the stored mapping set; a missing file is an empty set
    pub async fn load(&self) -> Result<Vec<DeviceMapping>, PersistenceError> {
        if !self.exists().await? {
            debug!("No mapping file at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        let file: MappingFile =
            toml::from_str(&content).map_err(|e| PersistenceError::Malformed {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        info!(
            "Loaded mappings for {} device(s) from {}",
            file.devices.len(),
            self.path.display()
        );
        Ok(file.devices)
    }

    /// Loads into a store, falling back to an empty one on any error
    pub async fn load_or_empty(&self) -> MappingStore {
        match self.load().await {
            Ok(devices) => MappingStore::from_devices(devices),
            Err(e @ PersistenceError::Malformed { .. }) => {
                warn!("{}; starting with an empty mapping set", e);
                MappingStore::new()
            }
            Err(e) => {
                error!("Failed to load mappings: {}; starting with an empty mapping set", e);
                MappingStore::new()
            }
        }
    }

    /// Writes the mapping set, replacing the file atomically
    pub async fn save(&self, devices: &[DeviceMapping]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let file = MappingFile {
            devices: devices.to_vec(),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| PersistenceError::Serialize(e.to_string()))?;

        let staging = self.path.with_extension("toml.tmp");
        tokio::fs::write(&staging, content)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        info!(
            "Saved mappings for {} device(s) to {}",
            devices.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Periodically saves the store when it changed since the last save
    pub fn start_autosave_task(
        self: Arc<Self>,
        store: Arc<RwLock<MappingStore>>,
        interval_seconds: u64,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        info!(
            "Starting autosave task with interval: {}s",
            interval_seconds
        );

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds.max(1)));
            // First tick fires immediately
            interval.tick().await;
            let mut last_saved = store.read().await.to_devices();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Autosave task stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let devices = store.read().await.to_devices();
                        if devices == last_saved {
                            debug!("Mappings unchanged, skipping autosave");
                            continue;
                        }
                        match self.save(&devices).await {
                            Ok(()) => {
                                debug!("Mappings autosaved successfully");
                                last_saved = devices;
                            }
                            Err(e) => error!("Failed to autosave mappings: {}", e),
                        }
                    }
                }
            }
        })
    }
}

fn config_base_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{AxisMode, Direction, MappingDefaults};

    fn scratch_repository(name: &str) -> MappingRepository {
        let mut dir = std::env::temp_dir();
        dir.push(format!("padmapper-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&dir);
        MappingRepository::new(dir.join(MAPPINGS_FILE))
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_set() {
        let repository = scratch_repository("missing");
        assert!(!repository.exists().await.unwrap());
        assert!(repository.load().await.unwrap().is_empty());
        assert!(repository.load_or_empty().await.is_empty());
    }

    #[tokio::test]
    async fn saved_layout_loads_back_with_modes_intact() {
        let repository = scratch_repository("saved");
        let layout = DeviceMapping::default_layout(0, &MappingDefaults::default());

        repository.save(&[layout.clone()]).await.unwrap();
        let loaded = repository.load().await.unwrap();

        assert_eq!(loaded, vec![layout]);
        let store = MappingStore::from_devices(loaded);
        let device = store.device(0).unwrap();
        assert_eq!(device.stick_mode(0), Some(AxisMode::Hotkey));
        assert_eq!(device.stick_mode(1), Some(AxisMode::Mouse));
        assert!(device.dpad().iter().any(|m| m.direction == Direction::Up));
    }

    #[tokio::test]
    async fn malformed_file_falls_back_to_empty() {
        let repository = scratch_repository("malformed");
        tokio::fs::create_dir_all(repository.path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(repository.path(), "[[devices]]\nbuttons = 7\n")
            .await
            .unwrap();

        assert!(matches!(
            repository.load().await,
            Err(PersistenceError::Malformed { .. })
        ));
        assert!(repository.load_or_empty().await.is_empty());
    }

    #[tokio::test]
    async fn hand_written_file_is_understood() {
        let repository = scratch_repository("handwritten");
        tokio::fs::create_dir_all(repository.path().parent().unwrap())
            .await
            .unwrap();
        let content = r#"
[[devices]]
device_index = 0

[[devices.buttons]]
button_index = 0
key = "Space"

[[devices.axes]]
mode = "hotkey"
stick_index = 0
direction = "up-left"
key = "Q"
threshold = 0.4

[[devices.axes]]
mode = "mouse"
stick_index = 1

[devices.axes.settings]
threshold = 0.2
sensitivity = 1.5
acceleration = 1.1
"#;
        tokio::fs::write(repository.path(), content).await.unwrap();

        let store = repository.load_or_empty().await;
        let device = store.device(0).unwrap();
        assert_eq!(device.buttons().len(), 1);
        assert_eq!(device.axes().len(), 2);
        assert_eq!(device.stick_mode(1), Some(AxisMode::Mouse));
    }
}
