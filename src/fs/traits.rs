//! VFS error taxonomy and the per-mount operation-vector capability trait.
//!
//! Concrete backends implement `FsOps` against `VfsNode`, the node pool's
//! shared representation, rather than owning their own inode type; the node
//! carries filesystem-specific state in `fs_data`, an opaque `u64` the
//! backend is free to interpret (an index into its own table, a block
//! number, whatever fits).

use super::vfs::{DirEntry, NodeId, VfsNode};

/// Closed error taxonomy. Every VFS-facing operation returns
/// one of these; there is no `Other(String)` escape hatch because the set
/// is meant to be exhaustively matched by syscall error translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    NoSuchEntry,
    Io,
    BadDescriptor,
    OutOfMemory,
    PermissionDenied,
    Exists,
    NotDirectory,
    IsDirectory,
    InvalidArgument,
    TooManyOpenFiles,
    ReadOnlyFilesystem,
    NameTooLong,
    NotEmpty,
    NotImplemented,
    Busy,
}

impl core::fmt::Display for VfsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            VfsError::NoSuchEntry => "no such file or directory",
            VfsError::Io => "I/O error",
            VfsError::BadDescriptor => "bad file descriptor",
            VfsError::OutOfMemory => "out of memory",
            VfsError::PermissionDenied => "permission denied",
            VfsError::Exists => "file exists",
            VfsError::NotDirectory => "not a directory",
            VfsError::IsDirectory => "is a directory",
            VfsError::InvalidArgument => "invalid argument",
            VfsError::TooManyOpenFiles => "too many open files",
            VfsError::ReadOnlyFilesystem => "read-only filesystem",
            VfsError::NameTooLong => "name too long",
            VfsError::NotEmpty => "directory not empty",
            VfsError::NotImplemented => "not implemented",
            VfsError::Busy => "resource busy",
        };
        f.write_str(s)
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

/// The capability set a concrete filesystem backend implements: every member the dispatcher might call, with defaults of
/// `NotImplemented`/`ReadOnlyFilesystem` for backends (like a read-only
/// `ramfs` snapshot) that don't support the full set.
pub trait FsOps: Sync + Send {
    fn name(&self) -> &'static str;

    /// Looks up `name` as a direct child of `dir`. `dir` is guaranteed by
    /// the caller to be a directory node belonging to this mount.
    fn finddir(&self, dir: &VfsNode, name: &str) -> VfsResult<NodeId>;

    fn open(&self, _node: &VfsNode) -> VfsResult<()> {
        Ok(())
    }

    fn close(&self, _node: &VfsNode) -> VfsResult<()> {
        Ok(())
    }

    fn read(&self, node: &VfsNode, offset: u64, buf: &mut [u8]) -> VfsResult<usize>;

    fn write(&self, _node: &mut VfsNode, _offset: u64, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::ReadOnlyFilesystem)
    }

    fn truncate(&self, _node: &mut VfsNode, _len: u64) -> VfsResult<()> {
        Err(VfsError::ReadOnlyFilesystem)
    }

    fn sync(&self, _node: &VfsNode) -> VfsResult<()> {
        Ok(())
    }

    /// Returns the `index`-th directory entry of `dir`, or `None` past the
    /// end. The VFS copies the result into its own static buffer before
    /// handing it to the caller.
    fn readdir(&self, dir: &VfsNode, index: usize) -> Option<DirEntry>;

    fn mkdir(&self, _parent: &VfsNode, _name: &str) -> VfsResult<NodeId> {
        Err(VfsError::ReadOnlyFilesystem)
    }

    fn rmdir(&self, _parent: &mut VfsNode, _name: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnlyFilesystem)
    }

    fn create(&self, _parent: &VfsNode, _name: &str) -> VfsResult<NodeId> {
        Err(VfsError::ReadOnlyFilesystem)
    }

    fn unlink(&self, _parent: &mut VfsNode, _name: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnlyFilesystem)
    }

    fn rename(&self, _old_parent: &VfsNode, _old_name: &str, _new_parent: &VfsNode, _new_name: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnlyFilesystem)
    }

    fn chmod(&self, _node: &mut VfsNode, _mode: u16) -> VfsResult<()> {
        Err(VfsError::NotImplemented)
    }

    fn chown(&self, _node: &mut VfsNode, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(VfsError::NotImplemented)
    }
}

/// Registered filesystem type: a name plus
/// the factory that produces a fresh backend + root node pair at mount
/// time. Immutable once registered.
pub struct FsType {
    pub name: &'static str,
    pub make_root_ops: fn() -> alloc::sync::Arc<dyn FsOps>,
}
