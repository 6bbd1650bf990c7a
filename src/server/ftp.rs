//! FTP/FTPS driver (`ftp://`, `ftps://`)
//!
//! Drives the `curl` binary with one short-lived subprocess per operation:
//! transfers through curl's FTP engine, control operations (DELE, RNFR/
//! RNTO, MKD, RMD, SITE CHMOD) through `-Q` quote commands against the
//! base directory. `ftps` adds `--ssl-reqd` so the control and data
//! channels are TLS-protected; `passiveMode = no` switches to an active
//! data connection.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::{Config, RemoteUrl, Scheme};
use crate::error::{SitesyncError, SitesyncResult};
use crate::server::{Progress, Server};

/// curl exit codes meaning "the remote file is not there".
const CURL_NOT_FOUND: &[i32] = &[9, 19, 78];

pub struct FtpServer {
    host: String,
    port: u16,
    base: String,
    credentials: Option<String>,
    tls: bool,
    passive: bool,
    file_permissions: Option<u32>,
    dir_permissions: Option<u32>,
}

impl FtpServer {
    pub fn new(url: &RemoteUrl, config: &Config) -> Self {
        let credentials = url.user.as_ref().map(|user| {
            format!("{user}:{}", url.password.as_deref().unwrap_or(""))
        });
        Self {
            host: url.host.clone(),
            port: url.port,
            base: url.path.clone(),
            credentials,
            tls: url.scheme == Scheme::Ftps,
            passive: config.passive_mode,
            file_permissions: config.file_permissions,
            dir_permissions: config.dir_permissions,
        }
    }

    /// Server-absolute path under the base directory.
    fn abs(&self, remote: &str) -> String {
        format!("{}{}", self.base, remote)
    }

    /// Transfer URL for a remote path.
    fn url(&self, remote: &str) -> String {
        format!(
            "ftp://{}:{}{}",
            self.host,
            self.port,
            encode_path(&self.abs(remote))
        )
    }

    fn base_url(&self) -> String {
        format!("ftp://{}:{}/", self.host, self.port)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("curl");
        cmd.arg("-s").arg("-S").arg("--connect-timeout").arg("30");
        if let Some(credentials) = &self.credentials {
            cmd.arg("--user").arg(credentials);
        }
        if self.tls {
            cmd.arg("--ssl-reqd");
        }
        if !self.passive {
            cmd.arg("--ftp-port").arg("-");
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    fn run(&self, cmd: &mut Command) -> Result<String, (i32, String)> {
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| (-1, format!("cannot spawn curl: {e}")))?;
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err((code, message));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run quote commands against the base directory. Commands prefixed
    /// with `*` are tolerated when the server rejects them.
    fn control(&self, quotes: &[String]) -> Result<(), (i32, String)> {
        let mut cmd = self.command();
        for quote in quotes {
            cmd.arg("-Q").arg(quote);
        }
        cmd.arg("--list-only").arg(self.base_url());
        self.run(&mut cmd).map(|_| ())
    }

    /// NLST of a remote directory.
    fn list(&self, remote: &str) -> Result<Vec<String>, (i32, String)> {
        let mut cmd = self.command();
        cmd.arg("--list-only").arg(format!("{}/", self.url(remote)));
        let listing = self.run(&mut cmd)?;
        Ok(listing
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty() && *l != "." && *l != "..")
            // Some servers NLST full paths.
            .map(|l| l.rsplit('/').next().unwrap_or(l).to_string())
            .collect())
    }

    fn transport(remote: &str, (code, message): (i32, String)) -> SitesyncError {
        if CURL_NOT_FOUND.contains(&code) {
            SitesyncError::NotFound {
                path: remote.to_string(),
            }
        } else {
            SitesyncError::Transport {
                path: remote.to_string(),
                message: format!("curl exit {code}: {message}"),
            }
        }
    }

    fn purge_tree(
        &self,
        remote: &str,
        progress: &mut dyn FnMut(&str),
    ) -> SitesyncResult<()> {
        let children = self
            .list(remote)
            .map_err(|e| Self::transport(remote, e))?;
        for child in children {
            let child_rel = format!("{remote}/{child}");
            // DELE first; what refuses deletion as a file is a directory.
            let deleted = self
                .control(&[format!("DELE {}", self.abs(&child_rel))])
                .is_ok();
            if !deleted {
                self.purge_tree(&child_rel, progress)?;
                self.control(&[format!("*RMD {}", self.abs(&child_rel))])
                    .map_err(|e| Self::transport(&child_rel, e))?;
            }
            progress(&child_rel);
        }
        Ok(())
    }
}

impl Server for FtpServer {
    fn connect(&mut self) -> SitesyncResult<()> {
        let mut cmd = self.command();
        cmd.arg("--list-only").arg(self.base_url());
        self.run(&mut cmd)
            .map(|_| ())
            .map_err(|(code, message)| SitesyncError::Connection {
                target: format!("ftp://{}:{}", self.host, self.port),
                message: format!("curl exit {code}: {message}"),
            })
    }

    fn read_file(&self, remote: &str, local: &Path) -> SitesyncResult<()> {
        let mut cmd = self.command();
        cmd.arg("-o").arg(local).arg(self.url(remote));
        self.run(&mut cmd)
            .map(|_| ())
            .map_err(|e| Self::transport(remote, e))
    }

    fn write_file(&self, local: &Path, remote: &str, progress: Progress) -> SitesyncResult<()> {
        progress(0);
        let mut cmd = self.command();
        cmd.arg("-T")
            .arg(local)
            .arg("--ftp-create-dirs")
            .arg(self.url(remote));
        self.run(&mut cmd)
            .map(|_| ())
            .map_err(|e| Self::transport(remote, e))?;
        if let Some(mode) = self.file_permissions {
            self.chmod(remote, mode)?;
        }
        progress(100);
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> SitesyncResult<()> {
        // RNTO over an existing name is not portable, so the target is
        // dropped first (tolerated when absent).
        self.control(&[
            format!("*DELE {}", self.abs(to)),
            format!("RNFR {}", self.abs(from)),
            format!("RNTO {}", self.abs(to)),
        ])
        .map_err(|e| Self::transport(from, e))?;
        if let Some(mode) = self.file_permissions {
            self.chmod(to, mode)?;
        }
        Ok(())
    }

    fn remove_file(&self, remote: &str) -> SitesyncResult<()> {
        self.control(&[format!("*DELE {}", self.abs(remote))])
            .map_err(|e| Self::transport(remote, e))
    }

    fn create_dir(&self, remote: &str) -> SitesyncResult<()> {
        let mut quotes = Vec::new();
        let mut path = String::new();
        for part in self.abs(remote).split('/').filter(|p| !p.is_empty()) {
            path.push('/');
            path.push_str(part);
            quotes.push(format!("*MKD {path}"));
        }
        if let Some(mode) = self.dir_permissions {
            quotes.push(format!("*SITE CHMOD {mode:o} {}", self.abs(remote)));
        }
        self.control(&quotes)
            .map_err(|e| Self::transport(remote, e))
    }

    fn remove_dir(&self, remote: &str) -> SitesyncResult<()> {
        self.control(&[format!("*RMD {}", self.abs(remote))])
            .map_err(|e| Self::transport(remote, e))
    }

    fn purge(&self, remote: &str, progress: &mut dyn FnMut(&str)) -> SitesyncResult<()> {
        if self.list(remote).is_err() {
            return self.create_dir(remote);
        }
        self.purge_tree(remote, progress)
    }

    fn chmod(&self, remote: &str, mode: u32) -> SitesyncResult<()> {
        // Best-effort: not every server implements SITE CHMOD.
        self.control(&[format!("*SITE CHMOD {mode:o} {}", self.abs(remote))])
            .map_err(|e| Self::transport(remote, e))
    }

    fn get_dir(&self) -> &str {
        &self.base
    }

    fn execute(&self, _cmd: &str) -> SitesyncResult<String> {
        Err(SitesyncError::Unsupported {
            op: "execute",
            driver: "ftp",
        })
    }
}

/// Percent-encode a server path for a curl URL, keeping `/` separators.
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'/' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
