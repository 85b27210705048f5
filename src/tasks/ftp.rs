//! FTP task: upload the current target's output directory.
//!
//! Credentials come from the target's section of `config.json`. The host may
//! carry a port (`ftp.example.com:2121`); the default is 21. Dist deploys send
//! everything; dev deploys consult the [`UploadLedger`] and only send files
//! whose content changed since the last upload to the same remote.
//!
//! The protocol lives behind [`RemoteStore`] / [`Connector`] so the task can
//! be exercised without a server.

use super::{TaskContext, TaskError, TaskReport, io_at};
use crate::config::FtpCredentials;
use crate::ledger::{UploadLedger, UploadStats, hash_file, remote_key};
use crate::sources::resolve;
use std::io::Cursor;
use std::path::Path;
use suppaftp::FtpStream;
use suppaftp::types::FileType;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 21;

#[derive(Error, Debug)]
pub enum FtpError {
    #[error("FTP host is not configured for this target")]
    MissingHost,
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: suppaftp::FtpError,
    },
    #[error("FTP login failed for {user}: {source}")]
    Login {
        user: String,
        #[source]
        source: suppaftp::FtpError,
    },
    #[error("FTP upload of {path} failed: {source}")]
    Upload {
        path: String,
        #[source]
        source: suppaftp::FtpError,
    },
    #[error("FTP error: {0}")]
    Protocol(#[from] suppaftp::FtpError),
}

/// An open session on a remote file store.
pub trait RemoteStore {
    /// Create `dir` and any missing parents. Existing directories are fine.
    fn mkdir_all(&mut self, dir: &str) -> Result<(), FtpError>;
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), FtpError>;
    fn quit(&mut self) -> Result<(), FtpError>;
}

/// Opens [`RemoteStore`] sessions.
pub trait Connector: Send + Sync {
    fn connect(&self, credentials: &FtpCredentials) -> Result<Box<dyn RemoteStore>, FtpError>;
}

/// Split `host[:port]`.
pub fn parse_host(host: &str) -> (String, u16) {
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name.to_string(), port),
            Err(_) => (host.to_string(), DEFAULT_PORT),
        },
        None => (host.to_string(), DEFAULT_PORT),
    }
}

/// Join a remote base directory and a relative path with `/`.
pub fn remote_path(base: &str, relative: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() && !base.starts_with('/') {
        relative.to_string()
    } else {
        format!("{trimmed}/{relative}")
    }
}

/// Real FTP sessions through `suppaftp`.
pub struct FtpConnector;

struct FtpRemote {
    stream: FtpStream,
}

impl Connector for FtpConnector {
    fn connect(&self, credentials: &FtpCredentials) -> Result<Box<dyn RemoteStore>, FtpError> {
        if credentials.host.is_empty() {
            return Err(FtpError::MissingHost);
        }
        let (host, port) = parse_host(&credentials.host);
        let address = format!("{host}:{port}");
        let mut stream = FtpStream::connect(&address).map_err(|source| FtpError::Connect {
            address: address.clone(),
            source,
        })?;
        stream
            .login(&credentials.user, &credentials.pass)
            .map_err(|source| FtpError::Login {
                user: credentials.user.clone(),
                source,
            })?;
        stream.transfer_type(FileType::Binary)?;
        tracing::debug!(%address, "FTP session open");
        Ok(Box::new(FtpRemote { stream }))
    }
}

impl RemoteStore for FtpRemote {
    fn mkdir_all(&mut self, dir: &str) -> Result<(), FtpError> {
        let mut current = String::new();
        for part in dir.split('/') {
            if part.is_empty() {
                if current.is_empty() {
                    current.push('/');
                }
                continue;
            }
            if !current.is_empty() && !current.ends_with('/') {
                current.push('/');
            }
            current.push_str(part);
            // Fails when the directory exists; the upload reports real problems.
            let _ = self.stream.mkdir(&current);
        }
        Ok(())
    }

    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), FtpError> {
        self.stream
            .put_file(path, &mut Cursor::new(data))
            .map(|_| ())
            .map_err(|source| FtpError::Upload {
                path: path.to_string(),
                source,
            })
    }

    fn quit(&mut self) -> Result<(), FtpError> {
        self.stream.quit()?;
        Ok(())
    }
}

fn relative_key(relative: &Path) -> String {
    relative.to_string_lossy().replace('\\', "/")
}

pub fn run(
    ctx: &TaskContext,
    credentials: &FtpCredentials,
    connector: &dyn Connector,
) -> Result<TaskReport, TaskError> {
    let target = ctx.target;
    let out = ctx.output();
    let files = resolve(out, &["**/*"])?;

    let remote = remote_key(&credentials.host, &credentials.path);
    let ledger_path = ctx.layout.upload_ledger(target);
    let mut ledger = UploadLedger::load(&ledger_path, &remote);
    let mut stats = UploadStats::default();

    let mut pending = Vec::new();
    for file in files {
        let key = relative_key(&file.relative);
        let hash = hash_file(&file.path).map_err(io_at(&file.path))?;
        if target.skips_unchanged() && !ledger.needs_upload(&key, &hash) {
            stats.unchanged += 1;
            continue;
        }
        pending.push((file, key, hash));
    }

    let mut report = TaskReport {
        skipped: stats.unchanged as usize,
        ..Default::default()
    };
    if pending.is_empty() {
        tracing::info!(%target, "ftp: nothing to upload");
        return Ok(report);
    }

    let mut session = connector.connect(credentials)?;
    let mut made_dirs = std::collections::HashSet::new();

    for (file, key, hash) in pending {
        let destination = remote_path(&credentials.path, &key);
        if let Some((dir, _)) = destination.rsplit_once('/')
            && !dir.is_empty()
            && made_dirs.insert(dir.to_string())
        {
            session.mkdir_all(dir)?;
        }
        let data = std::fs::read(&file.path).map_err(io_at(&file.path))?;
        match session.put(&destination, &data) {
            Ok(()) => {
                tracing::debug!(file = %key, "uploaded");
                stats.uploaded += 1;
                ledger.record(key, hash);
                report.written.push(file.path);
            }
            Err(e) => {
                stats.failed += 1;
                report.failed += 1;
                ctx.errors.report(&e);
            }
        }
    }

    if let Err(e) = session.quit() {
        tracing::debug!(error = %e, "FTP quit failed");
    }
    ledger.save(&ledger_path).map_err(io_at(&ledger_path))?;
    tracing::info!(%target, "ftp: {stats}");

    ctx.reload(&report.written);
    Ok(report)
}
