//! Sandboxed SFTP subsystem handler.
//!
//! Implements just the operations the pushing server needs and confines
//! every path to the staging directory. Paths are normalized lexically; a
//! path that escapes the root is answered with permission denied.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

use russh_sftp::protocol::{
    Attrs, Data, File as SftpFile, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode,
    Version,
};

use certdeploy_config::logging::SFTP_TARGET;

/// Files created by the uploader default to owner-only access.
const DEFAULT_FILE_MODE: u32 = 0o600;
const DEFAULT_DIR_MODE: u32 = 0o700;

struct OpenHandle {
    file: File,
    path: PathBuf,
}

pub struct SftpHandler {
    root: PathBuf,
    handles: HashMap<String, OpenHandle>,
    dir_listings: HashMap<String, Vec<PathBuf>>,
    next_handle: u64,
    uploads: Arc<AtomicU64>,
}

impl SftpHandler {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            handles: HashMap::new(),
            dir_listings: HashMap::new(),
            next_handle: 0,
            uploads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counter of serviced writes. A session that never writes (probe or
    /// failed auth retry) must not trigger a deploy, so the listener checks
    /// this after the session ends.
    pub fn upload_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.uploads)
    }

    /// Normalize `path` against the staging root. `None` means the path
    /// escapes the sandbox.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let joined = if path.starts_with('/') {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        };
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return None;
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }
        normalized.starts_with(&self.root).then_some(normalized)
    }

    fn take_handle(&mut self) -> String {
        self.next_handle += 1;
        format!("handle-{}", self.next_handle)
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn errno_status(e: &std::io::Error) -> StatusCode {
    match e.kind() {
        std::io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn attrs_of(meta: &std::fs::Metadata) -> FileAttributes {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| u32::try_from(d.as_secs()).ok());
    FileAttributes {
        size: Some(meta.len()),
        uid: Some(meta.uid()),
        gid: Some(meta.gid()),
        permissions: Some(meta.permissions().mode()),
        atime: mtime,
        mtime,
        ..Default::default()
    }
}

fn apply_attrs(path: &Path, attrs: &FileAttributes) -> std::io::Result<()> {
    if let Some(mode) = attrs.permissions {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))?;
    }
    if let Some(mtime) = attrs.mtime {
        let time = nix::sys::time::TimeVal::new(i64::from(mtime), 0);
        nix::sys::stat::utimes(path, &time, &time)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
    }
    if attrs.uid.is_some() || attrs.gid.is_some() {
        let uid = attrs.uid.map(nix::unistd::Uid::from_raw);
        let gid = attrs.gid.map(nix::unistd::Gid::from_raw);
        // Ownership transfer needs privilege; without it the upload still
        // has to land, so a refusal is only logged.
        if let Err(e) = nix::unistd::chown(path, uid, gid) {
            tracing::debug!(target: SFTP_TARGET, "chown of {} skipped: {e}", path.display());
        }
    }
    Ok(())
}

impl russh_sftp::server::Handler for SftpHandler {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        tracing::debug!(target: SFTP_TARGET, "sftp session init, client version {version}");
        Ok(Version::new())
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        // The uploader only ever asks about paths inside the sandbox; answer
        // with the normalized absolute path.
        let resolved = self.resolve(&path).ok_or(StatusCode::PermissionDenied)?;
        let name = resolved.to_string_lossy().into_owned();
        Ok(Name { id, files: vec![SftpFile::dummy(name)] })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let path = self.resolve(&filename).ok_or(StatusCode::PermissionDenied)?;
        let mut options = OpenOptions::new();
        options
            .read(pflags.contains(OpenFlags::READ))
            .write(pflags.contains(OpenFlags::WRITE))
            .append(pflags.contains(OpenFlags::APPEND))
            .create(pflags.contains(OpenFlags::CREATE))
            .truncate(pflags.contains(OpenFlags::TRUNCATE))
            .mode(attrs.permissions.map(|m| m & 0o7777).unwrap_or(DEFAULT_FILE_MODE));
        let file = options.open(&path).map_err(|e| {
            tracing::debug!(target: SFTP_TARGET, "open of {} failed: {e}", path.display());
            errno_status(&e)
        })?;
        let handle = self.take_handle();
        self.handles.insert(handle.clone(), OpenHandle { file, path });
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        self.handles.remove(&handle);
        self.dir_listings.remove(&handle);
        Ok(ok_status(id))
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let open = self.handles.get(&handle).ok_or(StatusCode::Failure)?;
        open.file.write_all_at(&data, offset).map_err(|e| errno_status(&e))?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(ok_status(id))
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let open = self.handles.get(&handle).ok_or(StatusCode::Failure)?;
        let mut buf = vec![0u8; len as usize];
        let n = open.file.read_at(&mut buf, offset).map_err(|e| errno_status(&e))?;
        if n == 0 {
            return Err(StatusCode::Eof);
        }
        buf.truncate(n);
        Ok(Data { id, data: buf })
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let resolved = self.resolve(&path).ok_or(StatusCode::PermissionDenied)?;
        std::fs::DirBuilder::new()
            .mode(attrs.permissions.map(|m| m & 0o7777).unwrap_or(DEFAULT_DIR_MODE))
            .create(&resolved)
            .map_err(|e| errno_status(&e))?;
        Ok(ok_status(id))
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let resolved = self.resolve(&path).ok_or(StatusCode::PermissionDenied)?;
        let meta = std::fs::metadata(&resolved).map_err(|e| errno_status(&e))?;
        Ok(Attrs { id, attrs: attrs_of(&meta) })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let resolved = self.resolve(&path).ok_or(StatusCode::PermissionDenied)?;
        let meta = std::fs::symlink_metadata(&resolved).map_err(|e| errno_status(&e))?;
        Ok(Attrs { id, attrs: attrs_of(&meta) })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let open = self.handles.get(&handle).ok_or(StatusCode::Failure)?;
        let meta = open.file.metadata().map_err(|e| errno_status(&e))?;
        Ok(Attrs { id, attrs: attrs_of(&meta) })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let resolved = self.resolve(&path).ok_or(StatusCode::PermissionDenied)?;
        apply_attrs(&resolved, &attrs).map_err(|e| errno_status(&e))?;
        Ok(ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = self.handles.get(&handle).ok_or(StatusCode::Failure)?.path.clone();
        apply_attrs(&path, &attrs).map_err(|e| errno_status(&e))?;
        Ok(ok_status(id))
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        let from = self.resolve(&oldpath).ok_or(StatusCode::PermissionDenied)?;
        let to = self.resolve(&newpath).ok_or(StatusCode::PermissionDenied)?;
        std::fs::rename(&from, &to).map_err(|e| errno_status(&e))?;
        Ok(ok_status(id))
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        let path = self.resolve(&filename).ok_or(StatusCode::PermissionDenied)?;
        std::fs::remove_file(&path).map_err(|e| errno_status(&e))?;
        Ok(ok_status(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let resolved = self.resolve(&path).ok_or(StatusCode::PermissionDenied)?;
        let entries: Vec<PathBuf> = std::fs::read_dir(&resolved)
            .map_err(|e| errno_status(&e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        let handle = self.take_handle();
        self.dir_listings.insert(handle.clone(), entries);
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let entries = self.dir_listings.get_mut(&handle).ok_or(StatusCode::Failure)?;
        if entries.is_empty() {
            return Err(StatusCode::Eof);
        }
        let mut files = Vec::new();
        for path in entries.drain(..) {
            let file_name =
                path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            match std::fs::metadata(&path) {
                Ok(meta) => files.push(SftpFile::new(file_name, attrs_of(&meta))),
                Err(_) => files.push(SftpFile::dummy(file_name)),
            }
        }
        Ok(Name { id, files })
    }
}
