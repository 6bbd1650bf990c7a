//! Local filesystem driver (`file://`)
//!
//! Deploys into a directory on this machine. Useful on its own (network
//! mounts, staging checkouts) and as the reference driver for tests.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::config::{Config, RemoteUrl};
use crate::error::{SitesyncError, SitesyncResult};
use crate::server::{Progress, Server};

const COPY_CHUNK: usize = 64 * 1024;

pub struct LocalServer {
    base: PathBuf,
    base_str: String,
    file_permissions: Option<u32>,
    dir_permissions: Option<u32>,
    purge_counter: std::sync::atomic::AtomicU32,
}

impl LocalServer {
    pub fn new(url: &RemoteUrl, config: &Config) -> Self {
        Self {
            base: PathBuf::from(&url.path),
            base_str: url.path.clone(),
            file_permissions: config.file_permissions,
            dir_permissions: config.dir_permissions,
            purge_counter: std::sync::atomic::AtomicU32::new(0),
        }
    }

    fn abs(&self, remote: &str) -> PathBuf {
        self.base.join(remote.trim_start_matches('/'))
    }

    fn transport(remote: &str, err: io::Error) -> SitesyncError {
        if err.kind() == io::ErrorKind::NotFound {
            SitesyncError::NotFound {
                path: remote.to_string(),
            }
        } else {
            SitesyncError::Transport {
                path: remote.to_string(),
                message: err.to_string(),
            }
        }
    }

    fn apply_mode(path: &Path, mode: Option<u32>) {
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
        }
        #[cfg(not(unix))]
        let _ = (path, mode);
    }

    #[cfg(unix)]
    fn read_mode(path: &Path) -> Option<u32> {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).ok().map(|m| m.permissions().mode())
    }

    #[cfg(not(unix))]
    fn read_mode(_path: &Path) -> Option<u32> {
        None
    }
}

impl Server for LocalServer {
    fn connect(&mut self) -> SitesyncResult<()> {
        fs::create_dir_all(&self.base).map_err(|e| SitesyncError::Connection {
            target: format!("file://{}", self.base.display()),
            message: e.to_string(),
        })
    }

    fn read_file(&self, remote: &str, local: &Path) -> SitesyncResult<()> {
        fs::copy(self.abs(remote), local)
            .map(|_| ())
            .map_err(|e| Self::transport(remote, e))
    }

    fn write_file(&self, local: &Path, remote: &str, progress: Progress) -> SitesyncResult<()> {
        let target = self.abs(remote);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::transport(remote, e))?;
        }

        let mut src = fs::File::open(local)?;
        let total = src.metadata()?.len();
        let mut dst = fs::File::create(&target).map_err(|e| Self::transport(remote, e))?;

        progress(0);
        let mut copied: u64 = 0;
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = src.read(&mut buf)?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n])
                .map_err(|e| Self::transport(remote, e))?;
            copied += n as u64;
            if total > 0 {
                progress(((copied * 100) / total).min(100) as u8);
            }
        }
        dst.flush().map_err(|e| Self::transport(remote, e))?;
        progress(100);

        Self::apply_mode(&target, self.file_permissions);
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> SitesyncResult<()> {
        let src = self.abs(from);
        let dst = self.abs(to);
        let prior_mode = Self::read_mode(&dst);

        if let Err(first) = fs::rename(&src, &dst) {
            // A directory in the way (or a non-replacing platform): clear
            // the target and try once more.
            let cleared = if dst.is_dir() {
                fs::remove_dir(&dst).is_ok()
            } else {
                fs::remove_file(&dst).is_ok()
            };
            if !cleared {
                return Err(Self::transport(from, first));
            }
            fs::rename(&src, &dst).map_err(|e| Self::transport(from, e))?;
        }

        if let Some(mode) = prior_mode {
            Self::apply_mode(&dst, Some(mode));
        }
        Ok(())
    }

    fn remove_file(&self, remote: &str) -> SitesyncResult<()> {
        match fs::remove_file(self.abs(remote)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::transport(remote, e)),
        }
    }

    fn create_dir(&self, remote: &str) -> SitesyncResult<()> {
        let path = self.abs(remote);
        fs::create_dir_all(&path).map_err(|e| Self::transport(remote, e))?;
        Self::apply_mode(&path, self.dir_permissions);
        Ok(())
    }

    fn remove_dir(&self, remote: &str) -> SitesyncResult<()> {
        match fs::remove_dir(self.abs(remote)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::transport(remote, e)),
        }
    }

    fn purge(&self, remote: &str, progress: &mut dyn FnMut(&str)) -> SitesyncResult<()> {
        let dir = self.abs(remote);
        if !dir.exists() {
            return self.create_dir(remote);
        }

        // Move the whole tree aside first: a crash mid-delete leaves the
        // user-visible directory already empty.
        let n = self
            .purge_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let aside_name = format!(
            "{}.purging-{}-{n}",
            dir.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id()
        );
        let aside = dir.with_file_name(aside_name);
        fs::rename(&dir, &aside).map_err(|e| Self::transport(remote, e))?;
        self.create_dir(remote)?;

        for entry in walkdir::WalkDir::new(&aside)
            .contents_first(true)
            .into_iter()
            .flatten()
        {
            if entry.depth() == 0 {
                continue;
            }
            let name = entry.path().strip_prefix(&aside).unwrap_or(entry.path());
            progress(&format!("{}/{}", remote, name.display()));
        }
        fs::remove_dir_all(&aside).map_err(|e| Self::transport(remote, e))?;
        Ok(())
    }

    fn chmod(&self, remote: &str, mode: u32) -> SitesyncResult<()> {
        Self::apply_mode(&self.abs(remote), Some(mode));
        Ok(())
    }

    fn get_dir(&self) -> &str {
        &self.base_str
    }

    fn execute(&self, _cmd: &str) -> SitesyncResult<String> {
        Err(SitesyncError::Unsupported {
            op: "execute",
            driver: "local",
        })
    }
}
