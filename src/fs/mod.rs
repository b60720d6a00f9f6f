//! Filesystem subsystem: the Virtual File System dispatcher (`vfs`), its
//! error taxonomy and per-mount capability trait (`traits`), and the one
//! concrete backend this kernel ships (`ramfs`).

pub mod ramfs;
pub mod traits;
pub mod vfs;

pub use traits::{FsOps, FsType, VfsError, VfsResult};
pub use vfs::{
    close, closedir, create_file, exists, fstat, is_directory, is_file, mkdir, mount, open,
    opendir, read, readdir, rename, rmdir, seek, stat, unlink, unmount, write, DirEntry, NodeId,
    NodeKind, OpenFlags, Stat, Whence,
};

/// Mounts the in-memory filesystem at `/`, the only filesystem this kernel
/// brings up today.
pub fn init() {
    if let Err(e) = mount("/", "ramfs", ramfs::RamFs::make_root_ops(), false) {
        crate::kerror!("fs: failed to mount root ramfs: {}", e);
        return;
    }
    crate::kinfo!("fs: root ramfs mounted");
}
