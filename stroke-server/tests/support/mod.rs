#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{Value, json};
use stroke_core::{
    application::unit_of_work::CatalogUnitOfWork,
    database::MemoryStore,
    thumbnails::{ContainerExit, ContainerInvocation, ContainerRuntime},
};
use stroke_server::{
    AppState, build_app,
    infra::{
        config::Config,
        startup::{ProdStartupHooks, StartupHooks},
    },
};
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Runtime that writes each configured output file (content = its name)
/// into every writable mount. When gated, each run waits for `release`.
pub struct FakeThumbnailer {
    outputs: Vec<String>,
    gate: Option<Semaphore>,
}

impl FakeThumbnailer {
    pub fn producing(outputs: &[&str]) -> Self {
        Self {
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            gate: None,
        }
    }

    pub fn gated(outputs: &[&str]) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::producing(outputs)
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeThumbnailer {
    async fn run(&self, invocation: &ContainerInvocation) -> stroke_core::Result<ContainerExit> {
        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        for mount in invocation.mounts.iter().filter(|m| !m.read_only) {
            for name in &self.outputs {
                tokio::fs::write(mount.host.join(name), name.as_bytes()).await?;
            }
        }
        Ok(ContainerExit {
            code: Some(0),
            stderr: String::new(),
        })
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    _tempdir: TempDir,
}

pub async fn build_test_app() -> Result<TestApp> {
    build_test_app_with_runtime(Arc::new(FakeThumbnailer::producing(&[
        "slice_0.png",
        "slice_1.png",
    ])))
    .await
}

pub async fn build_test_app_with_runtime(runtime: Arc<FakeThumbnailer>) -> Result<TestApp> {
    let tempdir = TempDir::new()?;
    let config = Config::ephemeral(tempdir.path());
    config.ensure_directories()?;

    let uow = Arc::new(CatalogUnitOfWork::from_memory(Arc::new(MemoryStore::new())));
    let state = AppState::from_parts(config, uow, runtime).await?;
    ProdStartupHooks.run(&state).await?;

    let server = TestServer::builder()
        .build(build_app(state.clone()))
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    Ok(TestApp {
        server,
        state,
        _tempdir: tempdir,
    })
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Register `login` (first registration becomes admin) and return a token.
pub async fn register_and_login(server: &TestServer, login: &str) -> String {
    let password = format!("{login}-password");
    server
        .post("/api/v1/user")
        .json(&json!({
            "login": login,
            "email": format!("{login}@example.org"),
            "firstName": "Test",
            "lastName": login,
            "password": password,
        }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);
    login_as(server, login, &password).await
}

pub async fn login_as(server: &TestServer, login: &str, password: &str) -> String {
    let response = server
        .post("/api/v1/user/authentication")
        .json(&json!({ "login": login, "password": password }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["authToken"]["token"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_default()
}

/// Create a study and return its JSON.
pub async fn create_study(server: &TestServer, token: &str, patient_id: &str, public: bool) -> Value {
    let response = server
        .post("/api/v1/study")
        .add_header("Authorization", bearer(token))
        .json(&json!({
            "patientId": patient_id,
            "date": "2024-03-01",
            "modality": "CT",
            "public": public,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json()
}

pub async fn create_series(server: &TestServer, token: &str, study_id: &str, name: &str) -> Value {
    let response = server
        .post("/api/v1/series")
        .add_header("Authorization", bearer(token))
        .json(&json!({ "studyId": study_id, "name": name }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json()
}

/// Poll a job until it leaves the queued/running states.
pub async fn wait_for_job(server: &TestServer, token: &str, job_id: &str) -> Value {
    for _ in 0..200 {
        let job: Value = server
            .get(&format!("/api/v1/job/{job_id}"))
            .add_header("Authorization", bearer(token))
            .await
            .json();
        if matches!(job["status"].as_str(), Some("success" | "error" | "cancelled")) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}
