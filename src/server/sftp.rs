//! SFTP driver (`sftp://`)
//!
//! Drives the OpenSSH client binaries (`ssh`, `scp`) with one short-lived
//! subprocess per operation. Authentication is whatever the local SSH
//! setup provides (agent, keys, config); when ssh itself needs a
//! passphrase it prompts on the inherited terminal.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::{Config, RemoteUrl};
use crate::error::{SitesyncError, SitesyncResult};
use crate::server::{shell_quote, Progress, Server};

pub struct SftpServer {
    target: String,
    port: u16,
    base: String,
    file_permissions: Option<u32>,
    dir_permissions: Option<u32>,
    purge_counter: std::sync::atomic::AtomicU32,
}

impl SftpServer {
    pub fn new(url: &RemoteUrl, config: &Config) -> Self {
        let target = match &url.user {
            Some(user) => format!("{user}@{}", url.host),
            None => url.host.clone(),
        };
        Self {
            target,
            port: url.port,
            base: url.path.clone(),
            file_permissions: config.file_permissions,
            dir_permissions: config.dir_permissions,
            purge_counter: std::sync::atomic::AtomicU32::new(0),
        }
    }

    fn abs(&self, remote: &str) -> String {
        format!("{}{}", self.base, remote)
    }

    /// Run a shell command on the remote host, returning stdout.
    fn ssh(&self, command: &str) -> Result<String, String> {
        let output = Command::new("ssh")
            .arg("-p")
            .arg(self.port.to_string())
            .arg(&self.target)
            .arg(command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| format!("cannot spawn ssh: {e}"))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn scp(&self, from: &str, to: &str) -> Result<(), String> {
        let output = Command::new("scp")
            .arg("-q")
            .arg("-P")
            .arg(self.port.to_string())
            .arg(from)
            .arg(to)
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| format!("cannot spawn scp: {e}"))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(())
    }

    fn transport(remote: &str, message: String) -> SitesyncError {
        if message.contains("No such file") {
            SitesyncError::NotFound {
                path: remote.to_string(),
            }
        } else {
            SitesyncError::Transport {
                path: remote.to_string(),
                message,
            }
        }
    }
}

impl Server for SftpServer {
    fn connect(&mut self) -> SitesyncResult<()> {
        // One round trip verifies auth and makes sure the base exists.
        let cmd = format!("mkdir -p {}", shell_quote(&self.abs("/")));
        self.ssh(&cmd).map(|_| ()).map_err(|message| {
            SitesyncError::Connection {
                target: format!("sftp://{}:{}", self.target, self.port),
                message,
            }
        })
    }

    fn read_file(&self, remote: &str, local: &Path) -> SitesyncResult<()> {
        let from = format!("{}:{}", self.target, shell_quote(&self.abs(remote)));
        self.scp(&from, &local.to_string_lossy())
            .map_err(|m| Self::transport(remote, m))
    }

    fn write_file(&self, local: &Path, remote: &str, progress: Progress) -> SitesyncResult<()> {
        progress(0);
        let to = format!("{}:{}", self.target, shell_quote(&self.abs(remote)));
        self.scp(&local.to_string_lossy(), &to)
            .map_err(|m| Self::transport(remote, m))?;
        if let Some(mode) = self.file_permissions {
            self.chmod(remote, mode)?;
        }
        progress(100);
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> SitesyncResult<()> {
        let src = shell_quote(&self.abs(from));
        let dst = shell_quote(&self.abs(to));
        // Capture the replaced file's mode first so `mv -f` (atomic
        // replace) keeps the permissions the live file had.
        let cmd = format!(
            "m=$(stat -c %a {dst} 2>/dev/null || stat -f %Lp {dst} 2>/dev/null); \
             mv -f {src} {dst} && {{ [ -z \"$m\" ] || chmod \"$m\" {dst}; }}"
        );
        self.ssh(&cmd)
            .map(|_| ())
            .map_err(|m| Self::transport(from, m))
    }

    fn remove_file(&self, remote: &str) -> SitesyncResult<()> {
        let cmd = format!("rm -f {}", shell_quote(&self.abs(remote)));
        self.ssh(&cmd)
            .map(|_| ())
            .map_err(|m| Self::transport(remote, m))
    }

    fn create_dir(&self, remote: &str) -> SitesyncResult<()> {
        let path = shell_quote(&self.abs(remote));
        let cmd = match self.dir_permissions {
            Some(mode) => format!("mkdir -p {path} && chmod {mode:o} {path}"),
            None => format!("mkdir -p {path}"),
        };
        self.ssh(&cmd)
            .map(|_| ())
            .map_err(|m| Self::transport(remote, m))
    }

    fn remove_dir(&self, remote: &str) -> SitesyncResult<()> {
        let path = shell_quote(&self.abs(remote));
        let cmd = format!("[ ! -e {path} ] || rmdir {path}");
        self.ssh(&cmd)
            .map(|_| ())
            .map_err(|m| Self::transport(remote, m))
    }

    fn purge(&self, remote: &str, progress: &mut dyn FnMut(&str)) -> SitesyncResult<()> {
        let path = shell_quote(&self.abs(remote));
        let listing = self
            .ssh(&format!("mkdir -p {path} && ls -A {path}"))
            .map_err(|m| Self::transport(remote, m))?;

        for (i, child) in listing.lines().filter(|l| !l.is_empty()).enumerate() {
            let n = self
                .purge_counter
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let victim = shell_quote(&format!("{}/{}", self.abs(remote), child));
            // Rename out of sight first, then delete: a failure between
            // the two never leaves a half-deleted visible entry.
            let staged = shell_quote(&format!(
                "{}/.purge-{}-{n}-{i}",
                self.abs(remote),
                std::process::id()
            ));
            let cmd = format!("mv {victim} {staged} && rm -rf {staged}");
            self.ssh(&cmd).map_err(|m| Self::transport(remote, m))?;
            progress(&format!("{remote}/{child}"));
        }
        Ok(())
    }

    fn chmod(&self, remote: &str, mode: u32) -> SitesyncResult<()> {
        let cmd = format!("chmod {mode:o} {}", shell_quote(&self.abs(remote)));
        self.ssh(&cmd)
            .map(|_| ())
            .map_err(|m| Self::transport(remote, m))
    }

    fn get_dir(&self) -> &str {
        &self.base
    }

    fn execute(&self, cmd: &str) -> SitesyncResult<String> {
        self.ssh(cmd).map_err(|m| SitesyncError::Transport {
            path: cmd.to_string(),
            message: m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;

    fn server(url: &str) -> SftpServer {
        let url = RemoteUrl::parse(url).unwrap();
        let config = Config::new(url.clone());
        SftpServer::new(&url, &config)
    }

    #[test]
    fn target_includes_user() {
        let s = server("sftp://deploy@example.com/var/www");
        assert_eq!(s.target, "deploy@example.com");
        assert_eq!(s.port, 22);
    }

    #[test]
    fn target_without_user_is_bare_host() {
        let s = server("sftp://example.com:2222/var/www");
        assert_eq!(s.target, "example.com");
        assert_eq!(s.port, 2222);
    }

    #[test]
    fn paths_compose_under_base() {
        let s = server("sftp://example.com/var/www");
        assert_eq!(s.abs("/index.php"), "/var/www/index.php");
        assert_eq!(s.get_dir(), "/var/www");
    }

    #[test]
    fn scheme_parses_as_sftp() {
        let url = RemoteUrl::parse("sftp://h/p").unwrap();
        assert_eq!(url.scheme, Scheme::Sftp);
    }
}
