//! Mapping editor worker
//!
//! All mutations of the shared [`MappingStore`] go through one worker task.
//! Callers hold an [`EditorClient`], send an [`EditorAction`] and await the
//! updated [`DeviceMapping`] on a oneshot channel. The frame loop only ever
//! takes read locks.

use crate::controller::BUTTON_COUNT;
use crate::mapping::{ActuationTarget, DeviceMapping, Direction, MappingError, MappingStore, MouseSettings};
use crate::persistence::MappingRepository;
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Sender};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

macro_rules! handle_action {
    ($action:expr, $response_tx:expr) => {
        if $response_tx.send($action.await).is_err() {
            error!("Failed to send editor response");
        }
    };
}

type Reply<T> = oneshot::Sender<Result<T, MappingError>>;

#[derive(Debug)]
pub enum EditorAction {
    SetButton {
        device: usize,
        button: usize,
        key: ActuationTarget,
        response_tx: Reply<DeviceMapping>,
    },
    RemoveButton {
        device: usize,
        button: usize,
        response_tx: Reply<DeviceMapping>,
    },
    SetAxisHotkey {
        device: usize,
        stick: usize,
        direction: Direction,
        key: ActuationTarget,
        threshold: f32,
        response_tx: Reply<DeviceMapping>,
    },
    SetAxisMouse {
        device: usize,
        stick: usize,
        settings: MouseSettings,
        response_tx: Reply<DeviceMapping>,
    },
    /// Without a direction every mapping of the stick is removed
    RemoveAxis {
        device: usize,
        stick: usize,
        direction: Option<Direction>,
        response_tx: Reply<DeviceMapping>,
    },
    SetDpad {
        device: usize,
        direction: Direction,
        key: ActuationTarget,
        response_tx: Reply<DeviceMapping>,
    },
    RemoveDpad {
        device: usize,
        direction: Direction,
        response_tx: Reply<DeviceMapping>,
    },
    ClearDevice {
        device: usize,
        response_tx: Reply<DeviceMapping>,
    },
    Snapshot {
        response_tx: Reply<Vec<DeviceMapping>>,
    },
    Save {
        response_tx: Reply<()>,
    },
}

pub struct MappingEditor {
    tx: Sender<EditorAction>,
    worker_handle: JoinHandle<()>,
}

impl MappingEditor {
    /// Spawns the worker; `repository` is used by [`EditorAction::Save`]
    pub fn spawn(
        store: Arc<RwLock<MappingStore>>,
        repository: Option<Arc<MappingRepository>>,
    ) -> Self {
        let (tx, mut rx) = channel::<EditorAction>(32);

        let worker_handle = tokio::spawn(async move {
            info!("Mapping editor started");
            while let Some(action) = rx.recv().await {
                debug!("Editor action: {:?}", action);
                match action {
                    EditorAction::SetButton {
                        device,
                        button,
                        key,
                        response_tx,
                    } => {
                        handle_action!(set_button(&store, device, button, key), response_tx);
                    }
                    EditorAction::RemoveButton {
                        device,
                        button,
                        response_tx,
                    } => {
                        handle_action!(
                            edit(&store, |s| s.remove_button_mapping(device, button).cloned()),
                            response_tx
                        );
                    }
                    EditorAction::SetAxisHotkey {
                        device,
                        stick,
                        direction,
                        key,
                        threshold,
                        response_tx,
                    } => {
                        handle_action!(
                            edit(&store, |s| s
                                .set_axis_hotkey(device, stick, direction, key, threshold)
                                .cloned()),
                            response_tx
                        );
                    }
                    EditorAction::SetAxisMouse {
                        device,
                        stick,
                        settings,
                        response_tx,
                    } => {
                        handle_action!(
                            edit(&store, |s| s.set_axis_mouse(device, stick, settings).cloned()),
                            response_tx
                        );
                    }
                    EditorAction::RemoveAxis {
                        device,
                        stick,
                        direction,
                        response_tx,
                    } => {
                        handle_action!(
                            edit(&store, |s| s
                                .remove_axis_mapping(device, stick, direction)
                                .cloned()),
                            response_tx
                        );
                    }
                    EditorAction::SetDpad {
                        device,
                        direction,
                        key,
                        response_tx,
                    } => {
                        handle_action!(
                            edit(&store, |s| Ok(s.set_dpad_mapping(device, direction, key).clone())),
                            response_tx
                        );
                    }
                    EditorAction::RemoveDpad {
                        device,
                        direction,
                        response_tx,
                    } => {
                        handle_action!(
                            edit(&store, |s| s.remove_dpad_mapping(device, direction).cloned()),
                            response_tx
                        );
                    }
                    EditorAction::ClearDevice {
                        device,
                        response_tx,
                    } => {
                        handle_action!(
                            edit(&store, |s| s.clear_device(device).cloned()),
                            response_tx
                        );
                    }
                    EditorAction::Snapshot { response_tx } => {
                        handle_action!(snapshot(&store), response_tx);
                    }
                    EditorAction::Save { response_tx } => {
                        handle_action!(save(&store, repository.as_deref()), response_tx);
                    }
                }
            }
            info!("Mapping editor stopped, all clients dropped");
        });

        Self { tx, worker_handle }
    }

    pub fn client(&self) -> EditorClient {
        EditorClient {
            tx: self.tx.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.worker_handle.is_finished()
    }
}

async fn edit<F>(store: &RwLock<MappingStore>, f: F) -> Result<DeviceMapping, MappingError>
where
    F: FnOnce(&mut MappingStore) -> Result<DeviceMapping, MappingError>,
{
    let mut store = store.write().await;
    let result = f(&mut store);
    if let Err(e) = &result {
        debug!("Mapping edit rejected: {}", e);
    }
    result
}

async fn set_button(
    store: &RwLock<MappingStore>,
    device: usize,
    button: usize,
    key: ActuationTarget,
) -> Result<DeviceMapping, MappingError> {
    if button >= BUTTON_COUNT {
        return Err(MappingError::UnknownButton(button));
    }
    edit(store, |s| Ok(s.set_button_mapping(device, button, key).clone())).await
}

async fn snapshot(store: &RwLock<MappingStore>) -> Result<Vec<DeviceMapping>, MappingError> {
    Ok(store.read().await.to_devices())
}

async fn save(
    store: &RwLock<MappingStore>,
    repository: Option<&MappingRepository>,
) -> Result<(), MappingError> {
    let Some(repository) = repository else {
        return Err(MappingError::Persistence(
            "No mapping repository configured".to_string(),
        ));
    };
    let devices = store.read().await.to_devices();
    repository
        .save(&devices)
        .await
        .map_err(|e| MappingError::Persistence(e.to_string()))
}

/// Cloneable front end of the editor worker
#[derive(Debug, Clone)]
pub struct EditorClient {
    tx: Sender<EditorAction>,
}

impl EditorClient {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EditorAction,
    ) -> Result<T, MappingError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(build(response_tx))
            .await
            .map_err(|e| MappingError::ChannelError(format!("Editor unavailable: {}", e)))?;
        response_rx
            .await
            .map_err(|e| MappingError::ChannelError(format!("Editor dropped request: {}", e)))?
    }

    pub async fn set_button_mapping(
        &self,
        device: usize,
        button: usize,
        key: &str,
    ) -> Result<DeviceMapping, MappingError> {
        let key = ActuationTarget::key(key)?;
        self.request(|response_tx| EditorAction::SetButton {
            device,
            button,
            key,
            response_tx,
        })
        .await
    }

    pub async fn remove_button_mapping(
        &self,
        device: usize,
        button: usize,
    ) -> Result<DeviceMapping, MappingError> {
        self.request(|response_tx| EditorAction::RemoveButton {
            device,
            button,
            response_tx,
        })
        .await
    }

    /// Maps a stick direction to a key; the stick leaves mouse mode if it was in it
    pub async fn set_axis_hotkey(
        &self,
        device: usize,
        stick: usize,
        direction: Direction,
        key: &str,
        threshold: f32,
    ) -> Result<DeviceMapping, MappingError> {
        let key = ActuationTarget::key(key)?;
        self.request(|response_tx| EditorAction::SetAxisHotkey {
            device,
            stick,
            direction,
            key,
            threshold,
            response_tx,
        })
        .await
    }

    /// Puts a stick into mouse mode, dropping its hotkeys
    pub async fn set_axis_mouse(
        &self,
        device: usize,
        stick: usize,
        settings: MouseSettings,
    ) -> Result<DeviceMapping, MappingError> {
        self.request(|response_tx| EditorAction::SetAxisMouse {
            device,
            stick,
            settings,
            response_tx,
        })
        .await
    }

    pub async fn remove_axis_mapping(
        &self,
        device: usize,
        stick: usize,
        direction: Option<Direction>,
    ) -> Result<DeviceMapping, MappingError> {
        self.request(|response_tx| EditorAction::RemoveAxis {
            device,
            stick,
            direction,
            response_tx,
        })
        .await
    }

    pub async fn set_dpad_mapping(
        &self,
        device: usize,
        direction: Direction,
        key: &str,
    ) -> Result<DeviceMapping, MappingError> {
        let key = ActuationTarget::key(key)?;
        self.request(|response_tx| EditorAction::SetDpad {
            device,
            direction,
            key,
            response_tx,
        })
        .await
    }

    pub async fn remove_dpad_mapping(
        &self,
        device: usize,
        direction: Direction,
    ) -> Result<DeviceMapping, MappingError> {
        self.request(|response_tx| EditorAction::RemoveDpad {
            device,
            direction,
            response_tx,
        })
        .await
    }

    pub async fn clear_device(&self, device: usize) -> Result<DeviceMapping, MappingError> {
        self.request(|response_tx| EditorAction::ClearDevice {
            device,
            response_tx,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<Vec<DeviceMapping>, MappingError> {
        self.request(|response_tx| EditorAction::Snapshot { response_tx })
            .await
    }

    pub async fn save(&self) -> Result<(), MappingError> {
        self.request(|response_tx| EditorAction::Save { response_tx })
            .await
    }
}
