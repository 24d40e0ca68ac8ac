use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;

const SIMPLE_MODULE: &str = r#""""A simple module."""

import os


def greet(name: str) -> str:
    """Return a greeting string."""
    return f"Hello, {name}!"


def farewell(name: str) -> str:
    msg = greet(name)
    return msg
"#;

struct Service {
    child: Child,
    base_url: String,
    _home: TempDir,
}

impl Drop for Service {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Spawn the service with an isolated home directory so databases land in a
/// throwaway ~/.arbor
fn start_service() -> Service {
    let home = TempDir::new().unwrap();
    let port = free_port();
    let base_url = format!("http://127.0.0.1:{port}");

    let child = Command::new(env!("CARGO_BIN_EXE_arbor-service"))
        .args(["--port", &port.to_string()])
        .env("HOME", home.path())
        .spawn()
        .expect("failed to start arbor-service");

    let service = Service {
        child,
        base_url,
        _home: home,
    };
    assert!(
        wait_for_service(&service.base_url, Duration::from_secs(10)),
        "service failed to start"
    );
    service
}

fn wait_for_service(base_url: &str, timeout: Duration) -> bool {
    let client = reqwest::blocking::Client::new();
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if client.get(format!("{base_url}/status")).send().is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

fn create_test_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("simple_module.py"), SIMPLE_MODULE).unwrap();
    dir
}

#[test]
fn test_service_lifecycle() {
    let project = create_test_project();
    let service = start_service();
    let client = reqwest::blocking::Client::new();
    let root = project.path().to_string_lossy().to_string();

    // 1. Register: index runs synchronously before the response
    let resp = client
        .post(format!("{}/projects", service.base_url))
        .json(&serde_json::json!({ "root": &root }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["message"], "registered");
    assert_eq!(body["indexed_files"], 1);
    let canonical_root = body["root"].as_str().unwrap().to_string();

    // Re-registration is idempotent
    let resp = client
        .post(format!("{}/projects", service.base_url))
        .json(&serde_json::json!({ "root": &root }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // 2. Nodes by name
    let nodes: serde_json::Value = client
        .get(format!("{}/nodes", service.base_url))
        .query(&[("root", canonical_root.as_str()), ("name", "greet")])
        .send()
        .unwrap()
        .json()
        .unwrap();
    let nodes = nodes.as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["id"], "simple_module.greet");
    assert_eq!(nodes[0]["kind"], "function");

    // 3. Single node and its edges
    let node: serde_json::Value = client
        .get(format!(
            "{}/nodes/simple_module.farewell",
            service.base_url
        ))
        .query(&[("root", canonical_root.as_str())])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(node["parent_id"], "simple_module");

    let edges: serde_json::Value = client
        .get(format!(
            "{}/nodes/simple_module.farewell/edges",
            service.base_url
        ))
        .query(&[("root", canonical_root.as_str()), ("direction", "out")])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert!(edges
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["target_id"] == "greet" && e["kind"] == "calls"));

    // 4. Skeleton endpoint
    let file = project
        .path()
        .join("simple_module.py")
        .to_string_lossy()
        .to_string();
    let skeleton: serde_json::Value = client
        .get(format!("{}/skeleton", service.base_url))
        .query(&[("file", file.as_str())])
        .send()
        .unwrap()
        .json()
        .unwrap();
    let text = skeleton["skeleton"].as_str().unwrap();
    assert!(text.contains("def greet(name: str) -> str:"));
    assert!(text.contains("..."));
    assert!(!text.contains("msg = greet(name)"));

    // 5. Capsule
    let capsule: serde_json::Value = client
        .get(format!("{}/capsule/simple_module.greet", service.base_url))
        .query(&[("root", canonical_root.as_str())])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert!(capsule["capsule"]
        .as_str()
        .unwrap()
        .contains("# Context Capsule: `simple_module.greet`"));

    // 6. Observations and resume
    let resp = client
        .post(format!("{}/observations", service.base_url))
        .json(&serde_json::json!({
            "root": &canonical_root,
            "content": "Decided to keep greet pure",
            "source": "claude",
            "tags": ["decision"],
        }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let obs: serde_json::Value = resp.json().unwrap();
    let obs_id = obs["id"].as_i64().unwrap();

    let listed: serde_json::Value = client
        .get(format!("{}/observations", service.base_url))
        .query(&[("root", canonical_root.as_str()), ("tag", "decision")])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let resume: serde_json::Value = client
        .get(format!("{}/resume", service.base_url))
        .query(&[("root", canonical_root.as_str()), ("budget", "10000")])
        .send()
        .unwrap()
        .json()
        .unwrap();
    let resume_text = resume["resume"].as_str().unwrap();
    assert!(resume_text.contains("# Session Resume"));
    assert!(resume_text.contains("Decided to keep greet pure"));

    let resp = client
        .delete(format!("{}/observations/{obs_id}", service.base_url))
        .query(&[("root", canonical_root.as_str())])
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // 7. Status reflects the running watcher
    let status: serde_json::Value = client
        .get(format!("{}/status", service.base_url))
        .query(&[("root", canonical_root.as_str())])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(status["service"], "arbor-service");
    assert!(status["db_stats"]["nodes"].as_u64().unwrap() > 0);
    assert_eq!(status["watchers"][&canonical_root]["running"], true);
}

#[test]
fn test_watcher_picks_up_new_files() {
    let project = create_test_project();
    let service = start_service();
    let client = reqwest::blocking::Client::new();
    let root = project.path().to_string_lossy().to_string();

    let body: serde_json::Value = client
        .post(format!("{}/projects", service.base_url))
        .json(&serde_json::json!({ "root": &root }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    let canonical_root = body["root"].as_str().unwrap().to_string();

    std::fs::write(
        project.path().join("fresh.py"),
        "def fresh_func():\n    pass\n",
    )
    .unwrap();

    // Debounce is 500ms; poll until the watcher has reconciled
    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    let mut found = false;
    while std::time::Instant::now() < deadline {
        let nodes: serde_json::Value = client
            .get(format!("{}/nodes", service.base_url))
            .query(&[("root", canonical_root.as_str()), ("name", "fresh_func")])
            .send()
            .unwrap()
            .json()
            .unwrap();
        if !nodes.as_array().unwrap().is_empty() {
            found = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(300));
    }
    assert!(found, "watcher did not index the new file");
}

#[test]
fn test_error_envelopes() {
    let service = start_service();
    let client = reqwest::blocking::Client::new();

    // Missing root
    let resp = client
        .post(format!("{}/projects", service.base_url))
        .json(&serde_json::json!({}))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body["code"], "invalid_input");

    // Nonexistent directory
    let resp = client
        .post(format!("{}/projects", service.base_url))
        .json(&serde_json::json!({ "root": "/does/not/exist" }))
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    // Unknown skeleton file
    let resp = client
        .get(format!("{}/skeleton", service.base_url))
        .query(&[("file", "/does/not/exist.py")])
        .send()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
