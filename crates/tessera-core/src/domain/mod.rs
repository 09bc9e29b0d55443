//! Domain types shared by every host adapter and service.

pub mod details;
pub mod fs;
pub mod version;
pub mod worker;

pub use details::{FreeMemorySource, RuntimeKind, SystemDetails};
pub use fs::{
    CopyDiagnostic, CopyDiagnosticLevel, CopyResults, CopyTask, FileStat, FsError, FsErrorKind,
    MkdirOptions, MkdirResult, RemoveResult, RenameResult, RmdirOptions, WriteFileResult,
};
pub use version::{Version, VersionError, VersionRange};
pub use worker::{
    TaskId, TaskOutcome, TaskRequest, WorkerId, WorkerRequest, WorkerResponse, WorkerResult,
    WorkerTask, encode_line,
};
