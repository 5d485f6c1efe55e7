//! Webhook server tests over real TCP

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::Value;
use shiphook::app::options::{AppOptions, DeployOptions, ServerOptions, WebhookOptions};
use shiphook::app::run::{start, RunningServer};
use tempfile::TempDir;
use tokio::sync::oneshot;

struct TestServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    server: RunningServer,
}

impl TestServer {
    async fn start(
        repo: &Path,
        path: &str,
        run_script: &str,
        secret: Option<&str>,
        run_timeout: Duration,
    ) -> Self {
        let options = AppOptions {
            server: ServerOptions {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            webhook: WebhookOptions {
                path: path.to_string(),
                repo_path: repo.to_path_buf(),
                run_script: run_script.to_string(),
                secret: secret.map(SecretString::from),
            },
            deploy: DeployOptions {
                run_timeout,
                pull_timeout: Duration::from_secs(30),
            },
        };

        let (tx, rx) = oneshot::channel::<()>();
        let server = start(options, async move {
            let _ = rx.await;
        })
        .await
        .unwrap();

        Self {
            base_url: format!("http://{}", server.local_addr),
            shutdown: Some(tx),
            server,
        }
    }

    async fn post(&self, path: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut request = reqwest::Client::new().post(format!("{}{}", self.base_url, path));
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.server.handle.await.unwrap().unwrap();
    }
}

fn repo_with_script(name: &str, contents: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let _ = std::process::Command::new("git")
        .arg("init")
        .current_dir(dir.path())
        .output();
    std::fs::write(dir.path().join(name), contents).unwrap();
    dir
}

#[tokio::test]
async fn test_post_to_other_path_is_not_found() {
    let repo = repo_with_script("deploy.sh", "echo ok\n");
    let server = TestServer::start(repo.path(), "/", "sh deploy.sh", None, Duration::from_secs(10)).await;

    let (status, body) = server.post("/other", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, serde_json::json!({ "ok": false, "error": "Not found" }));

    server.stop().await;
}

#[tokio::test]
async fn test_get_is_not_found() {
    let repo = repo_with_script("deploy.sh", "echo ok\n");
    let server = TestServer::start(repo.path(), "/", "sh deploy.sh", None, Duration::from_secs(10)).await;

    let response = reqwest::get(format!("{}/", server.base_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);

    server.stop().await;
}

#[tokio::test]
async fn test_post_runs_pull_and_script() {
    let repo = repo_with_script("deploy.sh", "echo ok\n");
    let server = TestServer::start(repo.path(), "/", "sh deploy.sh", None, Duration::from_secs(10)).await;

    let (status, body) = server.post("/", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["run"]["stdout"].as_str().unwrap().trim(), "ok");
    assert_eq!(body["run"]["exitCode"], 0);
    // No remote configured, so the pull fails without blocking the run.
    assert_eq!(body["pull"]["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("git pull failed"));

    server.stop().await;
}

#[tokio::test]
async fn test_secret_is_required_when_configured() {
    let repo = repo_with_script("deploy.sh", "echo ok\n");
    let server = TestServer::start(
        repo.path(),
        "/hook",
        "sh deploy.sh",
        Some("required-secret"),
        Duration::from_secs(10),
    )
    .await;

    let (status, body) = server.post("/hook", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, serde_json::json!({ "ok": false, "error": "Unauthorized" }));

    let (status, _) = server.post("/hook", &[("X-Shiphook-Secret", "wrong")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server
        .post("/hook/", &[("X-Shiphook-Secret", "required-secret")])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, _) = server
        .post("/hook?ref=main", &[("Authorization", "Bearer required-secret")])
        .await;
    assert_eq!(status, StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_failing_script_reports_exit_code() {
    let repo = repo_with_script("fail.sh", "exit 7\n");
    let server = TestServer::start(repo.path(), "/", "sh fail.sh", None, Duration::from_secs(10)).await;

    let (status, body) = server.post("/", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert_eq!(body["run"]["exitCode"], 7);

    server.stop().await;
}

#[tokio::test]
async fn test_hanging_script_times_out() {
    let repo = repo_with_script("hang.sh", "exec sleep 30\n");
    let server = TestServer::start(repo.path(), "/", "sh hang.sh", None, Duration::from_secs(1)).await;

    let (status, body) = server.post("/", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert!(body["run"]["exitCode"].is_null());
    assert!(body["error"].as_str().unwrap().contains("timed out"));

    server.stop().await;
}

#[tokio::test]
async fn test_third_overlapping_trigger_is_rejected() {
    let repo = repo_with_script("slow.sh", "sleep 1\necho done\n");
    let server = TestServer::start(repo.path(), "/", "sh slow.sh", None, Duration::from_secs(10)).await;

    let trigger = |url: String| {
        tokio::spawn(async move {
            let response = reqwest::Client::new().post(url).send().await.unwrap();
            let status = response.status();
            (status, response.json::<Value>().await.unwrap())
        })
    };

    let running = trigger(format!("{}/", server.base_url));
    tokio::time::sleep(Duration::from_millis(300)).await;
    let waiting = trigger(format!("{}/", server.base_url));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (status, body) = server.post("/", &[]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, serde_json::json!({ "ok": false, "error": "Deploy already queued" }));

    for task in [running, waiting] {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run"]["stdout"], "done\n");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_deploy_after_client_hangs_up() {
    let repo = repo_with_script("slow.sh", "sleep 1\ntouch deployed\n");
    let server = TestServer::start(repo.path(), "/", "sh slow.sh", None, Duration::from_secs(10)).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let sent = client.post(format!("{}/", server.base_url)).send().await;
    assert!(sent.is_err());
    drop(client);

    server.stop().await;
    assert!(repo.path().join("deployed").exists());
}
