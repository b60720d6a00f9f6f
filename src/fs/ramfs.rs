//! In-memory filesystem backend: the one concrete `FsOps` implementation
//! this kernel ships. Every
//! file/directory lives entirely in heap-allocated backend storage; nothing
//! survives a reboot.
//!
//! Each ramfs directory/file gets a VFS pool node (see `vfs::alloc_node`)
//! whose `fs_data` is an index (`ino`) into this backend's own entry table.
//! The table is the source of truth for directory contents and file bytes;
//! the pool node only carries the generic inode-like fields (size, times,
//! permissions) that the dispatcher maintains directly.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use super::traits::{FsOps, VfsError, VfsResult};
use super::vfs::{self, DirEntry, NodeId, NodeKind, VfsNode};

enum RamEntry {
    File { data: Vec<u8> },
    Directory { children: Vec<(String, NodeId)> },
}

struct RamFsState {
    entries: Vec<Option<RamEntry>>,
}

impl RamFsState {
    fn alloc_ino(&mut self, entry: RamEntry) -> u64 {
        if let Some(idx) = self.entries.iter().position(|e| e.is_none()) {
            self.entries[idx] = Some(entry);
            idx as u64
        } else {
            self.entries.push(Some(entry));
            (self.entries.len() - 1) as u64
        }
    }
}

/// Root-mountable ramfs instance. One `RamFs` per mount point; the root
/// directory is ino 0.
pub struct RamFs {
    state: Mutex<RamFsState>,
}

impl RamFs {
    pub fn new_with_root() -> Arc<Self> {
        let mut entries = Vec::new();
        entries.push(Some(RamEntry::Directory {
            children: Vec::new(),
        }));
        Arc::new(Self {
            state: Mutex::new(RamFsState { entries }),
        })
    }

    /// Factory matching `traits::FsType::make_root_ops`.
    pub fn make_root_ops() -> Arc<dyn FsOps> {
        Self::new_with_root()
    }
}

impl FsOps for RamFs {
    fn name(&self) -> &'static str {
        "ramfs"
    }

    fn finddir(&self, dir: &VfsNode, name: &str) -> VfsResult<NodeId> {
        let state = self.state.lock();
        let ino = dir.fs_data as usize;
        match state.entries.get(ino).and_then(|e| e.as_ref()) {
            Some(RamEntry::Directory { children }) => children
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, id)| *id)
                .ok_or(VfsError::NoSuchEntry),
            Some(RamEntry::File { .. }) => Err(VfsError::NotDirectory),
            None => Err(VfsError::Io),
        }
    }

    fn read(&self, node: &VfsNode, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let state = self.state.lock();
        let ino = node.fs_data as usize;
        match state.entries.get(ino).and_then(|e| e.as_ref()) {
            Some(RamEntry::File { data }) => {
                let offset = offset as usize;
                if offset >= data.len() {
                    return Ok(0);
                }
                let n = buf.len().min(data.len() - offset);
                buf[..n].copy_from_slice(&data[offset..offset + n]);
                Ok(n)
            }
            Some(RamEntry::Directory { .. }) => Err(VfsError::IsDirectory),
            None => Err(VfsError::Io),
        }
    }

    fn write(&self, node: &mut VfsNode, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        let mut state = self.state.lock();
        let ino = node.fs_data as usize;
        match state.entries.get_mut(ino).and_then(|e| e.as_mut()) {
            Some(RamEntry::File { data }) => {
                let offset = offset as usize;
                let end = offset + buf.len();
                if end > data.len() {
                    data.resize(end, 0);
                }
                data[offset..end].copy_from_slice(buf);
                Ok(buf.len())
            }
            Some(RamEntry::Directory { .. }) => Err(VfsError::IsDirectory),
            None => Err(VfsError::Io),
        }
    }

    fn truncate(&self, node: &mut VfsNode, len: u64) -> VfsResult<()> {
        let mut state = self.state.lock();
        let ino = node.fs_data as usize;
        match state.entries.get_mut(ino).and_then(|e| e.as_mut()) {
            Some(RamEntry::File { data }) => {
                data.resize(len as usize, 0);
                Ok(())
            }
            Some(RamEntry::Directory { .. }) => Err(VfsError::IsDirectory),
            None => Err(VfsError::Io),
        }
    }

    fn readdir(&self, dir: &VfsNode, index: usize) -> Option<DirEntry> {
        let state = self.state.lock();
        let ino = dir.fs_data as usize;
        match state.entries.get(ino).and_then(|e| e.as_ref()) {
            Some(RamEntry::Directory { children }) => {
                children.get(index).map(|(name, id)| {
                    let kind = if let Some(RamEntry::Directory { .. }) =
                        state.entries.get(node_ino(*id)).and_then(|e| e.as_ref())
                    {
                        NodeKind::Directory
                    } else {
                        NodeKind::File
                    };
                    DirEntry::new(*id, name, kind)
                })
            }
            _ => None,
        }
    }

    fn create(&self, parent: &VfsNode, name: &str) -> VfsResult<NodeId> {
        self.insert_child(parent, name, RamEntry::File { data: Vec::new() }, NodeKind::File)
    }

    fn mkdir(&self, parent: &VfsNode, name: &str) -> VfsResult<NodeId> {
        self.insert_child(
            parent,
            name,
            RamEntry::Directory {
                children: Vec::new(),
            },
            NodeKind::Directory,
        )
    }

    fn unlink(&self, parent: &mut VfsNode, name: &str) -> VfsResult<()> {
        let mut state = self.state.lock();
        let parent_ino = parent.fs_data as usize;
        let child_id = {
            let Some(RamEntry::Directory { children }) =
                state.entries.get(parent_ino).and_then(|e| e.as_ref())
            else {
                return Err(VfsError::NotDirectory);
            };
            let (_, id) = children
                .iter()
                .find(|(n, _)| n == name)
                .ok_or(VfsError::NoSuchEntry)?;
            *id
        };
        let child_ino = node_ino(child_id);
        if matches!(
            state.entries.get(child_ino).and_then(|e| e.as_ref()),
            Some(RamEntry::Directory { .. })
        ) {
            return Err(VfsError::IsDirectory);
        }
        if let Some(RamEntry::Directory { children }) =
            state.entries.get_mut(parent_ino).and_then(|e| e.as_mut())
        {
            children.retain(|(n, _)| n != name);
        }
        state.entries[child_ino] = None;
        drop(state);
        vfs::unlink_node(child_id);
        Ok(())
    }

    fn rmdir(&self, parent: &mut VfsNode, name: &str) -> VfsResult<()> {
        let mut state = self.state.lock();
        let parent_ino = parent.fs_data as usize;
        let child_id = {
            let Some(RamEntry::Directory { children }) =
                state.entries.get(parent_ino).and_then(|e| e.as_ref())
            else {
                return Err(VfsError::NotDirectory);
            };
            let (_, id) = children
                .iter()
                .find(|(n, _)| n == name)
                .ok_or(VfsError::NoSuchEntry)?;
            *id
        };
        let child_ino = node_ino(child_id);
        match state.entries.get(child_ino).and_then(|e| e.as_ref()) {
            Some(RamEntry::Directory { children }) if !children.is_empty() => {
                return Err(VfsError::NotEmpty)
            }
            Some(RamEntry::Directory { .. }) => {}
            Some(RamEntry::File { .. }) => return Err(VfsError::NotDirectory),
            None => return Err(VfsError::NoSuchEntry),
        }
        if let Some(RamEntry::Directory { children }) =
            state.entries.get_mut(parent_ino).and_then(|e| e.as_mut())
        {
            children.retain(|(n, _)| n != name);
        }
        state.entries[child_ino] = None;
        drop(state);
        vfs::unlink_node(child_id);
        Ok(())
    }

    fn rename(
        &self,
        old_parent: &VfsNode,
        old_name: &str,
        new_parent: &VfsNode,
        new_name: &str,
    ) -> VfsResult<()> {
        let mut state = self.state.lock();
        let old_ino = old_parent.fs_data as usize;
        let new_ino = new_parent.fs_data as usize;

        let entry = {
            let Some(RamEntry::Directory { children }) =
                state.entries.get_mut(old_ino).and_then(|e| e.as_mut())
            else {
                return Err(VfsError::NotDirectory);
            };
            let pos = children
                .iter()
                .position(|(n, _)| n == old_name)
                .ok_or(VfsError::NoSuchEntry)?;
            children.remove(pos)
        };

        let Some(RamEntry::Directory { children }) =
            state.entries.get_mut(new_ino).and_then(|e| e.as_mut())
        else {
            return Err(VfsError::NotDirectory);
        };
        if children.iter().any(|(n, _)| n == new_name) {
            return Err(VfsError::Exists);
        }
        children.push((new_name.to_string(), entry.1));
        Ok(())
    }
}

impl RamFs {
    fn insert_child(
        &self,
        parent: &VfsNode,
        name: &str,
        entry: RamEntry,
        kind: NodeKind,
    ) -> VfsResult<NodeId> {
        let mut state = self.state.lock();
        let parent_ino = parent.fs_data as usize;
        {
            let Some(RamEntry::Directory { children }) =
                state.entries.get(parent_ino).and_then(|e| e.as_ref())
            else {
                return Err(VfsError::NotDirectory);
            };
            if children.iter().any(|(n, _)| n == name) {
                return Err(VfsError::Exists);
            }
        }
        let ino = state.alloc_ino(entry);
        let node = vfs::new_node(parent, name, kind, ino);
        let node_id = vfs::alloc_node(node)?;
        if let Some(RamEntry::Directory { children }) =
            state.entries.get_mut(parent_ino).and_then(|e| e.as_mut())
        {
            children.push((name.to_string(), node_id));
        }
        Ok(node_id)
    }
}

/// Recovers the ramfs ino a `NodeId` carries. Valid because every node this
/// backend hands out was built by `vfs::new_node` with `fs_data == ino`.
fn node_ino(id: NodeId) -> usize {
    vfs::node_fs_data(id).unwrap_or(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::traits::VfsError;

    fn mount_ramfs() -> VfsResult<()> {
        super::super::vfs::mount("/", "ramfs", RamFs::make_root_ops(), false)
    }

    #[test]
    fn create_read_write_roundtrip() {
        let _ = mount_ramfs();
        let fd = super::super::vfs::open(
            "/hello.txt",
            super::super::vfs::OpenFlags(
                super::super::vfs::OpenFlags::CREATE | super::super::vfs::OpenFlags::WRITE,
            ),
        )
        .expect("create");
        super::super::vfs::write(fd, b"hi").expect("write");
        super::super::vfs::close(fd).expect("close");

        let fd = super::super::vfs::open(
            "/hello.txt",
            super::super::vfs::OpenFlags(super::super::vfs::OpenFlags::READ),
        )
        .expect("open for read");
        let mut buf = [0u8; 8];
        let n = super::super::vfs::read(fd, &mut buf).expect("read");
        assert_eq!(&buf[..n], b"hi");
        super::super::vfs::close(fd).expect("close");
        let _ = super::super::vfs::unlink("/hello.txt");
        let _ = super::super::vfs::unmount("/");
    }

    #[test]
    fn mkdir_rejects_duplicate() {
        let _ = mount_ramfs();
        super::super::vfs::mkdir("/d").expect("mkdir");
        assert_eq!(super::super::vfs::mkdir("/d"), Err(VfsError::Exists));
        let _ = super::super::vfs::rmdir("/d");
        let _ = super::super::vfs::unmount("/");
    }
}
