//! Shared test fixtures: an in-memory catalog wired to a temporary asset
//! store and a scripted container runtime.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use crate::{
    application::unit_of_work::CatalogUnitOfWork,
    artifacts::{ArtifactAttachmentManager, thumbnail_reference},
    assetstore::AssetStore,
    catalog::{CatalogHierarchyManager, NewStudy},
    database::memory::MemoryStore,
    error::Result,
    thumbnails::{
        ContainerExit, ContainerInvocation, ContainerRuntime, ContainerSubstrate, JobRegistry,
        ThumbnailOrchestrator, job_spec::DEFAULT_THUMBNAIL_IMAGE,
    },
    types::{FileRecord, Folder, FolderId, Item, ItemId, Upload, User},
    uploads::{UploadService, guess_mime_type},
};

enum Script {
    Produce(Vec<String>),
    Fail { code: i32, stderr: String },
}

/// Container runtime that writes canned outputs instead of starting
/// anything. Each output file contains its own name.
pub(crate) struct ScriptedRuntime {
    script: Script,
    gate: Option<Semaphore>,
    invocations: Mutex<Vec<ContainerInvocation>>,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    fn with_script(script: Script, gated: bool) -> Self {
        Self {
            script,
            gate: gated.then(|| Semaphore::new(0)),
            invocations: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn producing(outputs: &[&str]) -> Self {
        Self::with_script(
            Script::Produce(outputs.iter().map(|s| s.to_string()).collect()),
            false,
        )
    }

    /// Like [`producing`](Self::producing), but every run blocks until
    /// [`release`](Self::release) is called once for it.
    pub(crate) fn gated(outputs: &[&str]) -> Self {
        Self::with_script(
            Script::Produce(outputs.iter().map(|s| s.to_string()).collect()),
            true,
        )
    }

    pub(crate) fn failing(code: i32, stderr: &str) -> Self {
        Self::with_script(
            Script::Fail {
                code,
                stderr: stderr.to_string(),
            },
            false,
        )
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub(crate) fn invocations(&self) -> Vec<ContainerInvocation> {
        self.invocations.lock().clone()
    }

    /// Names of the files found in read-only mounts, across all runs.
    pub(crate) fn inputs_seen(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

async fn file_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerExit> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.invocations.lock().push(invocation.clone());

        for mount in invocation.mounts.iter().filter(|m| m.read_only) {
            let names = file_names(&mount.host).await?;
            self.inputs.lock().extend(names);
        }

        match &self.script {
            Script::Fail { code, stderr } => Ok(ContainerExit {
                code: Some(*code),
                stderr: stderr.clone(),
            }),
            Script::Produce(outputs) => {
                for mount in invocation.mounts.iter().filter(|m| !m.read_only) {
                    for name in outputs {
                        tokio::fs::write(mount.host.join(name), name.as_bytes()).await?;
                    }
                }
                Ok(ContainerExit {
                    code: Some(0),
                    stderr: String::new(),
                })
            }
        }
    }
}

pub(crate) struct Fixture {
    pub(crate) uow: Arc<CatalogUnitOfWork>,
    pub(crate) assets: AssetStore,
    pub(crate) attachments: ArtifactAttachmentManager,
    pub(crate) catalog: CatalogHierarchyManager,
    pub(crate) uploads: UploadService,
    pub(crate) substrate: Arc<ContainerSubstrate>,
    pub(crate) thumbnails: ThumbnailOrchestrator,
    pub(crate) owner: User,
    _dir: TempDir,
}

impl Fixture {
    pub(crate) async fn new() -> Self {
        Self::with_runtime(Arc::new(ScriptedRuntime::producing(&[]))).await
    }

    pub(crate) async fn with_runtime(runtime: Arc<ScriptedRuntime>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let uow = Arc::new(CatalogUnitOfWork::from_memory(Arc::new(MemoryStore::new())));
        let assets = AssetStore::new(dir.path().join("assets"));
        assets.ensure_layout().await.unwrap();

        let attachments = ArtifactAttachmentManager::new(uow.clone(), assets.clone());
        let catalog = CatalogHierarchyManager::new(uow.clone(), assets.clone(), attachments.clone());
        let uploads = UploadService::new(uow.clone(), assets.clone(), attachments.clone());
        let substrate = Arc::new(ContainerSubstrate::new(
            runtime,
            Arc::new(uploads.clone()),
            Arc::new(JobRegistry::new()),
            dir.path().join("jobs"),
            2,
        ));
        let thumbnails = ThumbnailOrchestrator::new(
            uow.clone(),
            assets.clone(),
            attachments.clone(),
            substrate.clone(),
            DEFAULT_THUMBNAIL_IMAGE,
        );

        let owner = uow
            .users
            .create_user(User::new("owner", "owner@example.org", "Study", "Owner", false))
            .await
            .unwrap();

        Self {
            uow,
            assets,
            attachments,
            catalog,
            uploads,
            substrate,
            thumbnails,
            owner,
            _dir: dir,
        }
    }

    pub(crate) async fn user(&self, login: &str) -> User {
        self.uow
            .users
            .create_user(User::new(login, format!("{login}@example.org"), "Test", "User", false))
            .await
            .unwrap()
    }

    async fn create_study(&self, patient_id: &str, public: bool) -> Folder {
        self.catalog
            .create_study(
                &self.owner,
                NewStudy {
                    patient_id: patient_id.to_string(),
                    study_date: Utc::now(),
                    modality: "CT".to_string(),
                    description: String::new(),
                    public,
                },
            )
            .await
            .unwrap()
    }

    pub(crate) async fn study(&self, patient_id: &str) -> Folder {
        self.create_study(patient_id, false).await
    }

    pub(crate) async fn public_study(&self, patient_id: &str) -> Folder {
        self.create_study(patient_id, true).await
    }

    /// A series in a fresh private study.
    pub(crate) async fn series(&self, name: &str) -> Item {
        let study = self.study(&format!("P-{name}")).await;
        self.catalog.create_series(&self.owner, study.id, name).await.unwrap()
    }

    pub(crate) async fn public_series(&self, name: &str) -> Item {
        let study = self.public_study(&format!("P-{name}")).await;
        self.catalog.create_series(&self.owner, study.id, name).await.unwrap()
    }

    pub(crate) async fn folder(&self, id: FolderId) -> Folder {
        self.uow.folders.get_folder(id).await.unwrap().unwrap()
    }

    pub(crate) async fn item(&self, id: ItemId) -> Item {
        self.uow.items.get_item(id).await.unwrap().unwrap()
    }

    /// Store a file on `item` without finalizing it. The blob holds the
    /// file name.
    pub(crate) async fn upload(
        &self,
        item: ItemId,
        name: &str,
        reference: Option<&str>,
    ) -> (Upload, FileRecord) {
        let lease = self.assets.put_reader(name.as_bytes()).await.unwrap();
        let upload = Upload {
            item_id: item,
            name: name.to_string(),
            mime_type: guess_mime_type(name),
            size: lease.blob().size,
            creator_id: Some(self.owner.id),
            reference: reference.map(str::to_string),
        };
        let record = upload.to_file(lease.blob().sha256.clone());
        let file = self.uow.files.create_file(record).await.unwrap();
        (upload, file)
    }

    /// Attach finalized thumbnail artifacts to `item`.
    pub(crate) async fn artifacts(&self, item: ItemId, names: &[&str]) -> Vec<FileRecord> {
        let reference = thumbnail_reference();
        let mut attached = Vec::new();
        for name in names {
            let (upload, file) = self.upload(item, name, Some(&reference)).await;
            attached.push(
                self.attachments
                    .handle_upload_finalized(&upload, file)
                    .await
                    .unwrap(),
            );
        }
        attached
    }
}
