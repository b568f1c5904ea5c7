//! Command types queued on the command channel.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ipc::messages::{Args, Request, Response};

/// Completion for a general command: `Some` if the daemon answered `ok`, `None` otherwise.
pub type ReplyCallback = Box<dyn FnOnce(Option<Response>) + Send + 'static>;

/// Completion for a file-info request.
pub type FileInfoCallback = Box<dyn FnOnce(FileInfo) + Send + 'static>;

/// Work item for the command worker.
pub enum Command {
    /// Status lookup for a single file or folder.
    FileInfo(FileInfoRequest),
    /// Any named command with arguments.
    General(GeneralCommand),
    /// Drop the current connection and start over.
    Reset,
}

impl Command {
    /// Name used in logs.
    pub fn label(&self) -> &str {
        match self {
            Command::FileInfo(_) => "file_info",
            Command::General(cmd) => &cmd.name,
            Command::Reset => "reset",
        }
    }

    /// Complete the command as failed.
    pub(crate) fn fail(self) {
        match self {
            Command::FileInfo(req) => {
                let is_directory = req.is_directory;
                req.complete(FileInfo::empty(is_directory));
            }
            Command::General(cmd) => cmd.complete(None),
            Command::Reset => {}
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::FileInfo(req) => f.debug_tuple("FileInfo").field(req).finish(),
            Command::General(cmd) => f.debug_tuple("General").field(cmd).finish(),
            Command::Reset => f.write_str("Reset"),
        }
    }
}

impl From<GeneralCommand> for Command {
    fn from(cmd: GeneralCommand) -> Self {
        Command::General(cmd)
    }
}

impl From<FileInfoRequest> for Command {
    fn from(req: FileInfoRequest) -> Self {
        Command::FileInfo(req)
    }
}

/// Shared cancellation flag for a file-info request.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress delivery of the result. The transaction itself still runs.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ask the daemon how a path is doing.
pub struct FileInfoRequest {
    /// Absolute path of the file or folder.
    pub path: PathBuf,
    /// Folders additionally get their folder tag looked up.
    pub is_directory: bool,
    cancelled: CancelHandle,
    on_complete: Option<FileInfoCallback>,
}

impl FileInfoRequest {
    pub fn new(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            is_directory,
            cancelled: CancelHandle::new(),
            on_complete: None,
        }
    }

    /// Set the completion callback.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(FileInfo) + Send + 'static,
    {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Handle that can cancel this request after it has been queued.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancelled.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// Deliver `info` unless the request was cancelled.
    pub(crate) fn complete(self, info: FileInfo) {
        if self.is_cancelled() {
            log::debug!("file info for {} cancelled, dropping result", self.path.display());
            return;
        }
        if let Some(callback) = self.on_complete {
            callback(info);
        }
    }
}

impl fmt::Debug for FileInfoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfoRequest")
            .field("path", &self.path)
            .field("is_directory", &self.is_directory)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A named command with arguments.
pub struct GeneralCommand {
    pub name: String,
    pub args: Args,
    on_complete: Option<ReplyCallback>,
}

impl GeneralCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Args::new(),
            on_complete: None,
        }
    }

    /// Add (or replace) an argument.
    pub fn with_arg<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Replace all arguments.
    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    /// Set the completion callback.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Option<Response>) + Send + 'static,
    {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Wire request for this command.
    pub fn request(&self) -> Request {
        Request::new(self.name.clone(), self.args.clone())
    }

    pub(crate) fn complete(self, reply: Option<Response>) {
        if let Some(callback) = self.on_complete {
            callback(reply);
        }
    }
}

impl fmt::Debug for GeneralCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneralCommand")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// Sync status reported by `icon_overlay_file_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    UpToDate,
    Syncing,
    Unsyncable,
    Unknown(String),
}

impl FileStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "up to date" => FileStatus::UpToDate,
            "syncing" => FileStatus::Syncing,
            "unsyncable" => FileStatus::Unsyncable,
            other => FileStatus::Unknown(other.to_string()),
        }
    }

    /// Emblem shown for this status, if any.
    pub fn emblem(&self) -> Option<&'static str> {
        match self {
            FileStatus::UpToDate => Some("dropbox-uptodate"),
            FileStatus::Syncing => Some("dropbox-syncing"),
            FileStatus::Unsyncable => Some("dropbox-unsyncable"),
            FileStatus::Unknown(_) => None,
        }
    }
}

/// Folder tag reported by `get_folder_tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderTag {
    Public,
    Shared,
    Photos,
    Sandbox,
    Other(String),
}

impl FolderTag {
    pub fn parse(value: &str) -> Self {
        match value {
            "public" => FolderTag::Public,
            "shared" => FolderTag::Shared,
            "photos" => FolderTag::Photos,
            "sandbox" => FolderTag::Sandbox,
            other => FolderTag::Other(other.to_string()),
        }
    }

    pub fn emblem(&self) -> Option<&'static str> {
        match self {
            FolderTag::Public => Some("web"),
            FolderTag::Shared => Some("people"),
            FolderTag::Photos => Some("photos"),
            FolderTag::Sandbox => Some("star"),
            FolderTag::Other(_) => None,
        }
    }
}

/// Everything the daemon said about one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub is_directory: bool,
    /// Reply to `get_emblems`; when present the other two were not asked.
    pub emblems: Option<Response>,
    /// Reply to `icon_overlay_file_status`.
    pub file_status: Option<Response>,
    /// Reply to `get_folder_tag` (folders only).
    pub folder_tag: Option<Response>,
}

impl FileInfo {
    /// Result with no replies, used for failures.
    pub fn empty(is_directory: bool) -> Self {
        Self {
            is_directory,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.emblems.is_none() && self.file_status.is_none() && self.folder_tag.is_none()
    }

    pub fn status(&self) -> Option<FileStatus> {
        first_value(self.file_status.as_ref(), "status").map(FileStatus::parse)
    }

    pub fn tag(&self) -> Option<FolderTag> {
        first_value(self.folder_tag.as_ref(), "tag").map(FolderTag::parse)
    }

    /// Emblem names to show for the path, or `None` if the lookup failed.
    ///
    /// A daemon-provided `emblems` list wins. Otherwise the status emblem is
    /// derived from `status`, preceded by the folder tag emblem for folders.
    /// A folder without a folder-tag reply counts as failed.
    pub fn emblem_names(&self) -> Option<Vec<String>> {
        if let Some(emblems) = self.emblems.as_ref().and_then(|r| r.get("emblems")) {
            return Some(emblems.iter().filter(|e| !e.is_empty()).cloned().collect());
        }

        let status = self.status()?;
        if self.is_directory && self.folder_tag.is_none() {
            return None;
        }

        let mut names = Vec::new();
        if let Some(emblem) = self.tag().as_ref().and_then(FolderTag::emblem) {
            names.push(emblem.to_string());
        }
        if let Some(emblem) = status.emblem() {
            names.push(emblem.to_string());
        }
        Some(names)
    }
}

fn first_value<'a>(response: Option<&'a Response>, key: &str) -> Option<&'a str> {
    response?.get(key)?.first().map(String::as_str)
}
