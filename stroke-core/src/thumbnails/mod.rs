//! Interactive thumbnail generation: job specifications, the execution
//! substrate that runs them in containers, and the orchestrator that ties
//! both to the catalog.

pub mod container;
pub mod environment;
pub mod job_spec;
pub mod orchestrator;
pub mod substrate;

pub use container::{
    ContainerExit, ContainerInvocation, ContainerRuntime, ContainerSubstrate, DockerCli,
    JobEnvironment, VolumeMount,
};
pub use job_spec::{ContainerArg, JobSpec, ResultHook};
pub use orchestrator::{ThumbnailContent, ThumbnailOrchestrator};
pub use substrate::{ExecutionSubstrate, Job, JobHandle, JobRegistry, JobStatus};
