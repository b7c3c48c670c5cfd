use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::error::{CatalogError, Result};
use crate::types::{FileRecord, ItemId, UserId};

use super::job_spec::{
    CONTAINER_INPUT_ROOT, CONTAINER_OUTPUT_ROOT, ContainerArg, JobSpec, ResultHook, path_component,
};
use super::substrate::{ExecutionSubstrate, JobHandle, JobRegistry, JobStatus};

/// Lines of container stderr kept in a job's error message.
const STDERR_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInvocation {
    pub image: String,
    pub args: Vec<String>,
    pub mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerExit {
    pub code: Option<i32>,
    pub stderr: String,
}

impl ContainerExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can run a container to completion.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerExit>;
}

/// Runs containers through the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker_path: PathBuf,
}

impl DockerCli {
    pub fn new(docker_path: impl Into<PathBuf>) -> Self {
        Self {
            docker_path: docker_path.into(),
        }
    }

    /// Arguments passed to `docker` for one invocation.
    pub fn command_args(invocation: &ContainerInvocation) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        for mount in &invocation.mounts {
            let mut spec = format!("{}:{}", mount.host.display(), mount.container);
            if mount.read_only {
                spec.push_str(":ro");
            }
            args.push("-v".to_string());
            args.push(spec);
        }
        args.push(invocation.image.clone());
        args.extend(invocation.args.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerExit> {
        let mut cmd = Command::new(&self.docker_path);
        cmd.args(Self::command_args(invocation));
        info!("Starting container with command: {:?}", cmd);

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CatalogError::internal(format!(
                    "failed to spawn {}: {e}",
                    self.docker_path.display()
                ))
            })?;

        Ok(ContainerExit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Catalog side of a job: inputs come from items, outputs go back to them.
#[async_trait]
pub trait JobEnvironment: Send + Sync {
    /// Write the item's files into `dir`. Returns how many were written.
    async fn materialize_item(&self, item: ItemId, dir: &Path) -> Result<usize>;

    /// Upload one output file onto `item`.
    async fn upload_output(
        &self,
        creator: Option<UserId>,
        item: ItemId,
        path: &Path,
        reference: &str,
    ) -> Result<FileRecord>;
}

/// Execution substrate that runs each job in a container with volumes laid
/// out under a per-job scratch directory.
#[derive(Clone)]
pub struct ContainerSubstrate {
    runtime: Arc<dyn ContainerRuntime>,
    environment: Arc<dyn JobEnvironment>,
    registry: Arc<JobRegistry>,
    work_dir: PathBuf,
    permits: Arc<Semaphore>,
}

impl fmt::Debug for ContainerSubstrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerSubstrate")
            .field("work_dir", &self.work_dir)
            .field("available_permits", &self.permits.available_permits())
            .field("registry", &self.registry)
            .finish()
    }
}

impl ContainerSubstrate {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        environment: Arc<dyn JobEnvironment>,
        registry: Arc<JobRegistry>,
        work_dir: impl Into<PathBuf>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            runtime,
            environment,
            registry,
            work_dir: work_dir.into(),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    async fn execute(&self, spec: &JobSpec) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(&self.work_dir)?;
        let input_root = scratch.path().join("input");
        let output_root = scratch.path().join("output");

        let mut mounts = Vec::new();
        for arg in &spec.args {
            match arg {
                ContainerArg::Literal(_) => {}
                ContainerArg::ItemInput { item_id, item_name } => {
                    let component = path_component(item_name);
                    let host = input_root.join(&component);
                    let count = self.environment.materialize_item(*item_id, &host).await?;
                    debug!(item = %item_id, files = count, "materialized job input");
                    mounts.push(VolumeMount {
                        host,
                        container: format!("{CONTAINER_INPUT_ROOT}/{component}"),
                        read_only: true,
                    });
                }
                ContainerArg::OutputVolume { name } => {
                    let component = path_component(name);
                    let host = output_root.join(&component);
                    tokio::fs::create_dir_all(&host).await?;
                    mounts.push(VolumeMount {
                        host,
                        container: format!("{CONTAINER_OUTPUT_ROOT}/{component}"),
                        read_only: false,
                    });
                }
            }
        }

        let invocation = ContainerInvocation {
            image: spec.image.clone(),
            args: spec.resolved_args(),
            mounts,
        };
        let exit = self.runtime.run(&invocation).await?;
        if !exit.success() {
            let tail: Vec<&str> = exit.stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(CatalogError::internal(format!(
                "container exited with status {}: {}",
                exit.code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                tail.join("\n")
            )));
        }

        for hook in &spec.hooks {
            self.run_hook(spec, hook, &output_root).await?;
        }
        Ok(())
    }

    async fn run_hook(&self, spec: &JobSpec, hook: &ResultHook, output_root: &Path) -> Result<()> {
        match hook {
            ResultHook::UploadVolumeToItem {
                volume,
                item_id,
                reference,
            } => {
                let dir = output_root.join(path_component(volume));
                let outputs = top_level_files(&dir).await?;
                info!(item = %item_id, outputs = outputs.len(), "uploading job outputs");
                for path in outputs {
                    self.environment
                        .upload_output(Some(spec.creator_id), *item_id, &path, reference)
                        .await?;
                }
                Ok(())
            }
        }
    }
}

/// Regular files directly inside `dir`, sorted by name. A missing directory
/// yields nothing.
async fn top_level_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl ExecutionSubstrate for ContainerSubstrate {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle> {
        let handle = self.registry.register(&spec);
        let job_id = handle.id();
        info!(job = %job_id, title = %spec.title, "job queued");

        let substrate = self.clone();
        tokio::spawn(async move {
            let _permit = match substrate.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    substrate.registry.update(
                        job_id,
                        JobStatus::Cancelled,
                        Some("execution substrate shut down".to_string()),
                    );
                    return;
                }
            };

            substrate.registry.update(job_id, JobStatus::Running, None);
            match substrate.execute(&spec).await {
                Ok(()) => {
                    info!(job = %job_id, "job finished");
                    substrate.registry.update(job_id, JobStatus::Success, None);
                }
                Err(err) => {
                    error!(job = %job_id, error = %err, "job failed");
                    substrate
                        .registry
                        .update(job_id, JobStatus::Error, Some(err.to_string()));
                }
            }
        });

        Ok(handle)
    }

    fn registry(&self) -> &JobRegistry {
        &self.registry
    }
}
