//! Common test utilities for sitesync end-to-end tests.
//!
//! `TestEnv` builds an isolated deployment: a temp local tree, a temp
//! "remote" directory reached through the `file://` driver, and a config
//! file wired to both. Commands run the real binary.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Result of running the sitesync binary.
#[derive(Debug)]
pub struct TestResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl TestResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Isolated deployment environment.
pub struct TestEnv {
    pub local: TempDir,
    pub remote: TempDir,
    pub config_path: PathBuf,
    _config_dir: TempDir,
}

impl TestEnv {
    /// Environment with a config containing only `remote`/`local` lines.
    pub fn new() -> TestEnv {
        Self::with_config("")
    }

    /// Environment whose config carries `extra` lines on top of the
    /// generated `remote` and `local` keys.
    pub fn with_config(extra: &str) -> TestEnv {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let config_dir = TempDir::new().unwrap();
        let config_path = config_dir.path().join("deploy.ini");
        let text = format!(
            "remote = file://{}\nlocal = {}\n{extra}",
            remote.path().display(),
            local.path().display(),
        );
        std::fs::write(&config_path, text).unwrap();
        TestEnv {
            local,
            remote,
            config_path,
            _config_dir: config_dir,
        }
    }

    /// Write a file into the local tree.
    pub fn write_local(&self, rel: &str, content: &str) {
        let path = self.local.path().join(rel.trim_start_matches('/'));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn remove_local(&self, rel: &str) {
        std::fs::remove_file(self.local.path().join(rel.trim_start_matches('/'))).unwrap();
    }

    /// Write a file straight into the remote directory.
    pub fn write_remote(&self, rel: &str, content: &str) {
        let path = self.remote.path().join(rel.trim_start_matches('/'));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn remote_file(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.remote.path().join(rel.trim_start_matches('/'))).ok()
    }

    pub fn remote_exists(&self, rel: &str) -> bool {
        self.remote
            .path()
            .join(rel.trim_start_matches('/'))
            .exists()
    }

    /// The deployed manifest's text, if present.
    pub fn manifest(&self) -> Option<String> {
        self.remote_file(".htdeployment")
    }

    /// Names of stray staging files left on the remote.
    pub fn staging_leftovers(&self) -> Vec<String> {
        fn walk(dir: &Path, found: &mut Vec<String>) {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        walk(&path, found);
                    } else if path.to_string_lossy().ends_with(".deploytmp") {
                        found.push(path.display().to_string());
                    }
                }
            }
        }
        let mut found = Vec::new();
        walk(self.remote.path(), &mut found);
        found
    }

    /// Run the sitesync binary against this environment's config.
    pub fn run(&self, extra_args: &[&str]) -> TestResult {
        let bin = env!("CARGO_BIN_EXE_sitesync");
        let output = Command::new(bin)
            .arg("--no-progress")
            .args(extra_args)
            .arg(&self.config_path)
            .output()
            .expect("binary runs");
        TestResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// Run and require exit code 0.
    pub fn deploy_ok(&self) -> TestResult {
        let result = self.run(&[]);
        assert_eq!(
            result.exit_code,
            0,
            "deployment failed:\n{}",
            result.combined()
        );
        result
    }
}
