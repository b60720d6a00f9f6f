//! Virtual File System: mount table, path resolver, node pool and the
//! open-file/open-directory handle tables.
//!
//! Nodes live in a fixed-capacity generational arena. A concrete backend (`fs::ramfs`) never
//! sees raw indices; it gets `NodeId`s back from its own `finddir`/`create`
//! calls and hands them to the dispatcher, which is the only place that
//! touches the pool directly.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::config::{
    MAX_MOUNTS, MAX_OPEN_DIRS, MAX_OPEN_FILES, MAX_PATH_COMPONENTS, MAX_PATH_LEN, MAX_VFS_NODES,
};

use super::traits::{FsOps, VfsError, VfsResult};

/// Generational handle into the node pool. A stale `NodeId` (pool slot
/// freed and reused) fails `NodePool::get` rather than silently aliasing
/// the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    CharDevice,
    BlockDevice,
    Pipe,
    Symlink,
    Socket,
    MountPoint,
}

pub struct VfsNode {
    pub name: String,
    pub kind: NodeKind,
    pub permissions: u16,
    pub uid: u32,
    pub gid: u32,
    pub inode_no: u64,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub nlink: u32,
    pub mount: usize,
    pub parent: Option<NodeId>,
    /// Opaque backend-owned key (e.g. an index into `ramfs`'s own table).
    pub fs_data: u64,
    pub refcount: u32,
    pub dirty: bool,
}

struct NodePool {
    slots: [Option<VfsNode>; MAX_VFS_NODES],
    generations: [u32; MAX_VFS_NODES],
}

impl NodePool {
    const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_VFS_NODES],
            generations: [0; MAX_VFS_NODES],
        }
    }

    fn alloc(&mut self, node: VfsNode) -> VfsResult<NodeId> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(VfsError::OutOfMemory)?;
        self.slots[idx] = Some(node);
        Ok(NodeId {
            index: idx as u32,
            generation: self.generations[idx],
        })
    }

    fn get(&self, id: NodeId) -> VfsResult<&VfsNode> {
        let idx = id.index as usize;
        if self.generations[idx] != id.generation {
            return Err(VfsError::BadDescriptor);
        }
        self.slots[idx].as_ref().ok_or(VfsError::BadDescriptor)
    }

    fn get_mut(&mut self, id: NodeId) -> VfsResult<&mut VfsNode> {
        let idx = id.index as usize;
        if self.generations[idx] != id.generation {
            return Err(VfsError::BadDescriptor);
        }
        self.slots[idx].as_mut().ok_or(VfsError::BadDescriptor)
    }

    /// Releases a pool slot and bumps its generation so any `NodeId` still
    /// pointing at it becomes invalid rather than aliasing the next
    /// occupant.
    fn free(&mut self, id: NodeId) {
        let idx = id.index as usize;
        if self.generations[idx] == id.generation && self.slots[idx].is_some() {
            self.slots[idx] = None;
            self.generations[idx] = self.generations[idx].wrapping_add(1);
        }
    }
}

static NODES: Mutex<NodePool> = Mutex::new(NodePool::new());

/// Increments `id`'s reference count.
pub fn ref_node(id: NodeId) {
    if let Ok(node) = NODES.lock().get_mut(id) {
        node.refcount += 1;
    }
}

/// Decrements `id`'s reference count, freeing the slot at zero. Decrementing
/// past zero is a caller bug; it's logged rather than
/// underflowing the counter.
pub fn unref_node(id: NodeId) {
    let mut pool = NODES.lock();
    let Ok(node) = pool.get_mut(id) else { return };
    if node.refcount == 0 {
        crate::kerror!("vfs: unref on node with refcount already 0 (double-unref?)");
        return;
    }
    node.refcount -= 1;
    if node.refcount == 0 {
        pool.free(id);
    }
}

pub fn node_refcount(id: NodeId) -> Option<u32> {
    NODES.lock().get(id).ok().map(|n| n.refcount)
}

/// Drops the durable reference a parent directory link held on `id`. Backends
/// call this from `unlink`/`rmdir` once the name is gone from the directory;
/// the node itself lives on until any open handles `unref_node` it too.
pub fn unlink_node(id: NodeId) {
    if let Ok(node) = NODES.lock().get_mut(id) {
        node.nlink = 0;
    }
    unref_node(id);
}

/// Backend-opaque key stashed on a node at creation time. Lets a backend
/// recover its own storage key from a `NodeId` it handed out earlier (e.g.
/// `ramfs` mapping a directory entry's `NodeId` back to its `ino`).
pub fn node_fs_data(id: NodeId) -> Option<u64> {
    NODES.lock().get(id).ok().map(|n| n.fs_data)
}

/// Allocates a pool slot for a freshly created node. Backends call this
/// from `create`/`mkdir` to get a `NodeId` to hand back to the dispatcher;
/// the dispatcher (not the backend) fills in `parent` afterwards, since
/// only it knows the parent's own `NodeId` at the call site.
pub fn alloc_node(node: VfsNode) -> VfsResult<NodeId> {
    NODES.lock().alloc(node)
}

/// Builds a fresh node with `fs_data` as its backend key, inheriting
/// `mount`/`uid`/`gid`/permissions from `template` (typically the parent
/// directory). Convenience for backends implementing `create`/`mkdir`.
pub fn new_node(template: &VfsNode, name: &str, kind: NodeKind, fs_data: u64) -> VfsNode {
    let now = crate::mm::timer::now_ms();
    VfsNode {
        name: String::from(name),
        kind,
        permissions: template.permissions,
        uid: template.uid,
        gid: template.gid,
        inode_no: fs_data,
        size: 0,
        atime: now,
        mtime: now,
        ctime: now,
        nlink: 1,
        mount: template.mount,
        parent: None,
        fs_data,
        refcount: 1,
        dirty: false,
    }
}

/// Directory entry returned by `readdir`, copied into the caller's buffer
/// by the dispatcher so backend storage lifetime never leaks out.
#[derive(Clone, Copy)]
pub struct DirEntry {
    pub node: NodeId,
    pub name: [u8; 64],
    pub name_len: u8,
    pub kind: NodeKind,
}

impl DirEntry {
    pub fn new(node: NodeId, name: &str, kind: NodeKind) -> Self {
        let mut buf = [0u8; 64];
        let len = name.len().min(64);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            node,
            name: buf,
            name_len: len as u8,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }
}

struct MountEntry {
    path: String,
    fs_type: &'static str,
    ops: Arc<dyn FsOps>,
    root: NodeId,
    read_only: bool,
    active: bool,
}

struct MountTable {
    entries: [Option<MountEntry>; MAX_MOUNTS],
}

impl MountTable {
    const fn new() -> Self {
        Self {
            entries: [const { None }; MAX_MOUNTS],
        }
    }
}

static MOUNTS: Mutex<MountTable> = Mutex::new(MountTable::new());

/// Tokenises `path` on `/`, drops `.` components, pops one level for `..`
/// (never above root), and rebuilds an absolute, normalised path.
pub fn normalize_path(path: &str) -> VfsResult<String> {
    if path.len() > MAX_PATH_LEN {
        return Err(VfsError::NameTooLong);
    }
    let mut stack: Vec<&str> = Vec::new();
    for component in path.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        if component == ".." {
            stack.pop();
            continue;
        }
        if stack.len() >= MAX_PATH_COMPONENTS {
            return Err(VfsError::NameTooLong);
        }
        stack.push(component);
    }
    let mut out = String::with_capacity(path.len() + 1);
    for component in &stack {
        out.push('/');
        out.push_str(component);
    }
    if out.is_empty() {
        out.push('/');
    }
    if out.len() > MAX_PATH_LEN {
        return Err(VfsError::NameTooLong);
    }
    Ok(out)
}

/// Returns the index of the active mount with the longest path prefix
/// matching `normalized`.
fn resolve_mount(mounts: &MountTable, normalized: &str) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, slot) in mounts.entries.iter().enumerate() {
        let Some(m) = slot else { continue };
        if !m.active {
            continue;
        }
        let matches = m.path == "/"
            || normalized == m.path
            || normalized.starts_with(&m.path) && normalized.as_bytes()[m.path.len()] == b'/';
        if matches && best.map_or(true, |(_, len)| m.path.len() > len) {
            best = Some((idx, m.path.len()));
        }
    }
    best.map(|(idx, _)| idx)
}

fn relative_components<'a>(normalized: &'a str, mount_path: &str) -> Vec<&'a str> {
    let rest = if mount_path == "/" {
        &normalized[1.min(normalized.len())..]
    } else {
        normalized[mount_path.len()..].trim_start_matches('/')
    };
    if rest.is_empty() {
        Vec::new()
    } else {
        rest.split('/').collect()
    }
}

/// Walks `normalized` one component at a time via the owning mount's
/// `finddir`, returning a node the caller now holds one reference to.
pub fn resolve_path(normalized: &str) -> VfsResult<NodeId> {
    let mounts = MOUNTS.lock();
    let mount_idx = resolve_mount(&mounts, normalized).ok_or(VfsError::NoSuchEntry)?;
    let mount = mounts.entries[mount_idx].as_ref().unwrap();
    let components = relative_components(normalized, &mount.path);

    let mut current = mount.root;
    ref_node(current);

    for component in components {
        let dir_is_dir = {
            let pool = NODES.lock();
            pool.get(current).map(|n| n.kind == NodeKind::Directory)?
        };
        if !dir_is_dir {
            unref_node(current);
            return Err(VfsError::NotDirectory);
        }
        let dir_snapshot = {
            let pool = NODES.lock();
            clone_node_readonly(pool.get(current)?)
        };
        let next = mount.ops.finddir(&dir_snapshot, component).map_err(|e| {
            unref_node(current);
            e
        })?;
        ref_node(next);
        unref_node(current);
        current = next;
    }
    Ok(current)
}

/// Shallow copy used only to hand backends a `&VfsNode` without holding the
/// node-pool lock across the (backend-internal-locking) `finddir` call.
fn clone_node_readonly(n: &VfsNode) -> VfsNode {
    VfsNode {
        name: n.name.clone(),
        kind: n.kind,
        permissions: n.permissions,
        uid: n.uid,
        gid: n.gid,
        inode_no: n.inode_no,
        size: n.size,
        atime: n.atime,
        mtime: n.mtime,
        ctime: n.ctime,
        nlink: n.nlink,
        mount: n.mount,
        parent: n.parent,
        fs_data: n.fs_data,
        refcount: n.refcount,
        dirty: n.dirty,
    }
}

fn split_parent(normalized: &str) -> (&str, &str) {
    match normalized.rfind('/') {
        Some(0) if normalized.len() == 1 => ("/", ""),
        Some(idx) => {
            let parent = if idx == 0 { "/" } else { &normalized[..idx] };
            (parent, &normalized[idx + 1..])
        }
        None => ("/", normalized),
    }
}

/// Mounts `ops` at `path`. Fails if the (normalised) path is already bound
/// by an active mount, or the mount table is full.
pub fn mount(path: &str, fs_type: &'static str, ops: Arc<dyn FsOps>, read_only: bool) -> VfsResult<()> {
    let normalized = normalize_path(path)?;
    let mut mounts = MOUNTS.lock();
    if resolve_mount(&mounts, &normalized).is_some() {
        return Err(VfsError::Exists);
    }
    let slot = mounts
        .entries
        .iter()
        .position(|s| s.is_none())
        .ok_or(VfsError::OutOfMemory)?;

    let now = crate::mm::timer::now_ms();
    let root = NODES.lock().alloc(VfsNode {
        name: String::from("/"),
        kind: NodeKind::Directory,
        permissions: 0o755,
        uid: 0,
        gid: 0,
        inode_no: 0,
        size: 0,
        atime: now,
        mtime: now,
        ctime: now,
        nlink: 1,
        mount: slot,
        parent: None,
        fs_data: 0,
        refcount: 1,
        dirty: false,
    })?;

    mounts.entries[slot] = Some(MountEntry {
        path: normalized.clone(),
        fs_type,
        ops,
        root,
        read_only,
        active: true,
    });
    crate::kinfo!("vfs: mounted {} ({}) at {}", fs_type, if read_only { "ro" } else { "rw" }, normalized);
    Ok(())
}

/// Unmounts the active mount at `path`. Fails `Busy` while any node of this
/// mount is still referenced.
pub fn unmount(path: &str) -> VfsResult<()> {
    let normalized = normalize_path(path)?;
    let mut mounts = MOUNTS.lock();
    let idx = resolve_mount(&mounts, &normalized).ok_or(VfsError::NoSuchEntry)?;
    if mounts.entries[idx].as_ref().unwrap().path != normalized {
        return Err(VfsError::NoSuchEntry);
    }

    let pool = NODES.lock();
    let busy = pool
        .slots
        .iter()
        .flatten()
        .any(|n| n.mount == idx && n.refcount > n.nlink);
    drop(pool);
    if busy {
        return Err(VfsError::Busy);
    }

    let root = mounts.entries[idx].as_ref().unwrap().root;
    unref_node(root);
    mounts.entries[idx] = None;
    Ok(())
}

/// Bitset of `open` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const READ: u32 = 1 << 0;
    pub const WRITE: u32 = 1 << 1;
    pub const CREATE: u32 = 1 << 2;
    pub const EXCLUSIVE: u32 = 1 << 3;
    pub const TRUNCATE: u32 = 1 << 4;
    pub const APPEND: u32 = 1 << 5;
    pub const DIRECTORY: u32 = 1 << 6;

    pub const fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

impl core::ops::BitOr<u32> for OpenFlags {
    type Output = OpenFlags;
    fn bitor(self, rhs: u32) -> OpenFlags {
        OpenFlags(self.0 | rhs)
    }
}

impl core::ops::BitOr for OpenFlags {
    type Output = OpenFlags;
    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy)]
struct FileHandleEntry {
    node: NodeId,
    offset: u64,
    flags: OpenFlags,
    refcount: u32,
    in_use: bool,
}

static OPEN_FILES: Mutex<[Option<FileHandleEntry>; MAX_OPEN_FILES]> =
    Mutex::new([None; MAX_OPEN_FILES]);

#[derive(Clone, Copy)]
struct DirHandleEntry {
    node: NodeId,
    next_index: usize,
    in_use: bool,
}

static OPEN_DIRS: Mutex<[Option<DirHandleEntry>; MAX_OPEN_DIRS]> =
    Mutex::new([None; MAX_OPEN_DIRS]);

pub type Fd = usize;

fn mount_read_only(mount_idx: usize) -> bool {
    MOUNTS
        .lock()
        .entries
        .get(mount_idx)
        .and_then(|s| s.as_ref())
        .map(|m| m.read_only)
        .unwrap_or(true)
}

fn mount_ops(mount_idx: usize) -> VfsResult<Arc<dyn FsOps>> {
    MOUNTS
        .lock()
        .entries
        .get(mount_idx)
        .and_then(|s| s.as_ref())
        .map(|m| m.ops.clone())
        .ok_or(VfsError::Io)
}

/// Opens (optionally creating) the file at `path`.
pub fn open(path: &str, flags: OpenFlags) -> VfsResult<Fd> {
    let normalized = normalize_path(path)?;

    let node = match resolve_path(&normalized) {
        Ok(node) => {
            if flags.contains(OpenFlags::CREATE) && flags.contains(OpenFlags::EXCLUSIVE) {
                unref_node(node);
                return Err(VfsError::Exists);
            }
            node
        }
        Err(VfsError::NoSuchEntry) if flags.contains(OpenFlags::CREATE) => {
            let (parent_path, name) = split_parent(&normalized);
            if name.is_empty() {
                return Err(VfsError::InvalidArgument);
            }
            let parent = resolve_path(parent_path)?;
            let mount_idx = { NODES.lock().get(parent)?.mount };
            if mount_read_only(mount_idx) {
                unref_node(parent);
                return Err(VfsError::ReadOnlyFilesystem);
            }
            let ops = mount_ops(mount_idx)?;
            let parent_snapshot = { clone_node_readonly(NODES.lock().get(parent)?) };
            let created = ops.create(&parent_snapshot, name);
            unref_node(parent);
            let created = created?;
            if let Ok(n) = NODES.lock().get_mut(created) {
                n.parent = Some(parent);
            }
            ref_node(created);
            created
        }
        Err(e) => return Err(e),
    };

    let (kind, mount_idx, size) = {
        let pool = NODES.lock();
        let n = pool.get(node)?;
        (n.kind, n.mount, n.size)
    };

    if kind == NodeKind::Directory && !flags.contains(OpenFlags::DIRECTORY) {
        unref_node(node);
        return Err(VfsError::IsDirectory);
    }

    let writable = flags.contains(OpenFlags::WRITE);
    if writable && mount_read_only(mount_idx) {
        unref_node(node);
        return Err(VfsError::ReadOnlyFilesystem);
    }

    let ops = mount_ops(mount_idx)?;
    {
        let pool = NODES.lock();
        let snapshot = clone_node_readonly(pool.get(node)?);
        ops.open(&snapshot)?;
    }

    if flags.contains(OpenFlags::TRUNCATE) && writable {
        let mut pool = NODES.lock();
        let n = pool.get_mut(node)?;
        ops.truncate(n, 0)?;
        n.size = 0;
    }

    let offset = if flags.contains(OpenFlags::APPEND) {
        size
    } else {
        0
    };

    let mut table = OPEN_FILES.lock();
    let slot = table
        .iter()
        .position(|s| s.is_none())
        .ok_or_else(|| {
            unref_node(node);
            VfsError::TooManyOpenFiles
        })?;
    table[slot] = Some(FileHandleEntry {
        node,
        offset,
        flags,
        refcount: 1,
        in_use: true,
    });
    Ok(slot)
}

fn with_handle<R>(fd: Fd, f: impl FnOnce(&mut FileHandleEntry) -> VfsResult<R>) -> VfsResult<R> {
    let mut table = OPEN_FILES.lock();
    let entry = table
        .get_mut(fd)
        .and_then(|s| s.as_mut())
        .filter(|e| e.in_use)
        .ok_or(VfsError::BadDescriptor)?;
    f(entry)
}

/// Reads up to `buf.len()` bytes at the handle's current offset, clipped to
/// the file's size; returns `0` at or past end-of-file without error.
pub fn read(fd: Fd, buf: &mut [u8]) -> VfsResult<usize> {
    let (node, offset, flags) = with_handle(fd, |e| Ok((e.node, e.offset, e.flags)))?;
    if !flags.contains(OpenFlags::READ) {
        return Err(VfsError::BadDescriptor);
    }
    let (kind, size, mount_idx) = {
        let pool = NODES.lock();
        let n = pool.get(node)?;
        (n.kind, n.size, n.mount)
    };
    if kind == NodeKind::Directory {
        return Err(VfsError::IsDirectory);
    }
    if offset >= size {
        return Ok(0);
    }
    let remaining = (size - offset) as usize;
    let to_read = buf.len().min(remaining);
    let ops = mount_ops(mount_idx)?;
    let n_read = {
        let pool = NODES.lock();
        let snapshot = clone_node_readonly(pool.get(node)?);
        ops.read(&snapshot, offset, &mut buf[..to_read])?
    };
    with_handle(fd, |e| {
        e.offset += n_read as u64;
        Ok(())
    })?;
    Ok(n_read)
}

/// Writes `buf` at the handle's current offset (snapped to end-of-file
/// first if opened with `APPEND`), extending the node's size and marking it
/// dirty when the write goes past the previous size.
pub fn write(fd: Fd, buf: &[u8]) -> VfsResult<usize> {
    let (node, mut offset, flags) = with_handle(fd, |e| Ok((e.node, e.offset, e.flags)))?;
    if !flags.contains(OpenFlags::WRITE) {
        return Err(VfsError::BadDescriptor);
    }
    let (kind, size, mount_idx) = {
        let pool = NODES.lock();
        let n = pool.get(node)?;
        (n.kind, n.size, n.mount)
    };
    if kind == NodeKind::Directory {
        return Err(VfsError::IsDirectory);
    }
    if flags.contains(OpenFlags::APPEND) {
        offset = size;
    }
    let ops = mount_ops(mount_idx)?;
    let n_written = {
        let mut pool = NODES.lock();
        let n = pool.get_mut(node)?;
        let written = ops.write(n, offset, buf)?;
        let end = offset + written as u64;
        if end > n.size {
            n.size = end;
            n.dirty = true;
        }
        written
    };
    with_handle(fd, |e| {
        e.offset = offset + n_written as u64;
        Ok(())
    })?;
    Ok(n_written)
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

/// Repositions the handle's offset. Rejects a resulting
/// negative offset with `InvalidArgument`.
pub fn seek(fd: Fd, delta: i64, whence: Whence) -> VfsResult<u64> {
    let (node, offset) = with_handle(fd, |e| Ok((e.node, e.offset)))?;
    let size = NODES.lock().get(node)?.size;
    let base: i64 = match whence {
        Whence::Set => 0,
        Whence::Current => offset as i64,
        Whence::End => size as i64,
    };
    let new_offset = base
        .checked_add(delta)
        .ok_or(VfsError::InvalidArgument)?;
    if new_offset < 0 {
        return Err(VfsError::InvalidArgument);
    }
    with_handle(fd, |e| {
        e.offset = new_offset as u64;
        Ok(())
    })?;
    Ok(new_offset as u64)
}

/// Closes `fd`, releasing its node reference.
pub fn close(fd: Fd) -> VfsResult<()> {
    let mut table = OPEN_FILES.lock();
    let entry = table
        .get_mut(fd)
        .and_then(|s| s.take())
        .filter(|e| e.in_use)
        .ok_or(VfsError::BadDescriptor)?;
    drop(table);
    let ops = mount_ops(NODES.lock().get(entry.node)?.mount)?;
    let snapshot = clone_node_readonly(NODES.lock().get(entry.node)?);
    let _ = ops.close(&snapshot);
    unref_node(entry.node);
    Ok(())
}

pub type DirFd = usize;

/// Opens a readdir cursor on the directory at `path`.
pub fn opendir(path: &str) -> VfsResult<DirFd> {
    let normalized = normalize_path(path)?;
    let node = resolve_path(&normalized)?;
    let is_dir = NODES.lock().get(node)?.kind == NodeKind::Directory;
    if !is_dir {
        unref_node(node);
        return Err(VfsError::NotDirectory);
    }
    let mut table = OPEN_DIRS.lock();
    let slot = table
        .iter()
        .position(|s| s.is_none())
        .ok_or_else(|| {
            unref_node(node);
            VfsError::TooManyOpenFiles
        })?;
    table[slot] = Some(DirHandleEntry {
        node,
        next_index: 0,
        in_use: true,
    });
    Ok(slot)
}

/// Returns the next entry and advances the cursor, or `None` past the end.
pub fn readdir(dfd: DirFd) -> VfsResult<Option<DirEntry>> {
    let (node, index) = {
        let table = OPEN_DIRS.lock();
        let entry = table
            .get(dfd)
            .and_then(|s| s.as_ref())
            .filter(|e| e.in_use)
            .ok_or(VfsError::BadDescriptor)?;
        (entry.node, entry.next_index)
    };
    let mount_idx = NODES.lock().get(node)?.mount;
    let ops = mount_ops(mount_idx)?;
    let snapshot = clone_node_readonly(NODES.lock().get(node)?);
    let entry = ops.readdir(&snapshot, index);
    if entry.is_some() {
        let mut table = OPEN_DIRS.lock();
        if let Some(h) = table.get_mut(dfd).and_then(|s| s.as_mut()) {
            h.next_index += 1;
        }
    }
    Ok(entry)
}

pub fn closedir(dfd: DirFd) -> VfsResult<()> {
    let mut table = OPEN_DIRS.lock();
    let entry = table
        .get_mut(dfd)
        .and_then(|s| s.take())
        .filter(|e| e.in_use)
        .ok_or(VfsError::BadDescriptor)?;
    drop(table);
    unref_node(entry.node);
    Ok(())
}

/// Metadata snapshot returned by `stat`/`fstat`.
#[derive(Clone, Copy)]
pub struct Stat {
    pub kind: NodeKind,
    pub permissions: u16,
    pub uid: u32,
    pub gid: u32,
    pub inode_no: u64,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub nlink: u32,
}

fn stat_of(n: &VfsNode) -> Stat {
    Stat {
        kind: n.kind,
        permissions: n.permissions,
        uid: n.uid,
        gid: n.gid,
        inode_no: n.inode_no,
        size: n.size,
        atime: n.atime,
        mtime: n.mtime,
        ctime: n.ctime,
        nlink: n.nlink,
    }
}

pub fn stat(path: &str) -> VfsResult<Stat> {
    let normalized = normalize_path(path)?;
    let node = resolve_path(&normalized)?;
    let result = NODES.lock().get(node).map(stat_of);
    unref_node(node);
    result
}

pub fn fstat(fd: Fd) -> VfsResult<Stat> {
    let node = with_handle(fd, |e| Ok(e.node))?;
    NODES.lock().get(node).map(stat_of)
}

pub fn exists(path: &str) -> bool {
    let Ok(normalized) = normalize_path(path) else {
        return false;
    };
    match resolve_path(&normalized) {
        Ok(node) => {
            unref_node(node);
            true
        }
        Err(_) => false,
    }
}

pub fn is_directory(path: &str) -> bool {
    stat(path).map(|s| s.kind == NodeKind::Directory).unwrap_or(false)
}

pub fn is_file(path: &str) -> bool {
    stat(path).map(|s| s.kind == NodeKind::File).unwrap_or(false)
}

fn require_writable_mount(node: NodeId) -> VfsResult<usize> {
    let mount_idx = NODES.lock().get(node)?.mount;
    if mount_read_only(mount_idx) {
        return Err(VfsError::ReadOnlyFilesystem);
    }
    Ok(mount_idx)
}

pub fn mkdir(path: &str) -> VfsResult<()> {
    let normalized = normalize_path(path)?;
    let (parent_path, name) = split_parent(&normalized);
    if name.is_empty() {
        return Err(VfsError::InvalidArgument);
    }
    let parent = resolve_path(parent_path)?;
    let mount_idx = require_writable_mount(parent).map_err(|e| {
        unref_node(parent);
        e
    })?;
    let ops = mount_ops(mount_idx)?;
    let parent_snapshot = clone_node_readonly(NODES.lock().get(parent)?);
    let result = ops.mkdir(&parent_snapshot, name);
    if let Ok(created) = result {
        if let Ok(n) = NODES.lock().get_mut(created) {
            n.parent = Some(parent);
        }
    }
    unref_node(parent);
    result.map(|_| ())
}

pub fn rmdir(path: &str) -> VfsResult<()> {
    let normalized = normalize_path(path)?;
    let (parent_path, name) = split_parent(&normalized);
    let parent = resolve_path(parent_path)?;
    let mount_idx = require_writable_mount(parent).map_err(|e| {
        unref_node(parent);
        e
    })?;
    let ops = mount_ops(mount_idx)?;
    let result = {
        let mut pool = NODES.lock();
        let parent_node = pool.get_mut(parent)?;
        ops.rmdir(parent_node, name)
    };
    unref_node(parent);
    result
}

pub fn create_file(path: &str) -> VfsResult<()> {
    open(path, OpenFlags(OpenFlags::CREATE | OpenFlags::WRITE)).map(|fd| {
        let _ = close(fd);
    })
}

pub fn unlink(path: &str) -> VfsResult<()> {
    let normalized = normalize_path(path)?;
    let (parent_path, name) = split_parent(&normalized);
    let parent = resolve_path(parent_path)?;
    let mount_idx = require_writable_mount(parent).map_err(|e| {
        unref_node(parent);
        e
    })?;
    let ops = mount_ops(mount_idx)?;
    let result = {
        let mut pool = NODES.lock();
        let parent_node = pool.get_mut(parent)?;
        ops.unlink(parent_node, name)
    };
    unref_node(parent);
    result
}

/// Renames a path; requires both parents reside on the same mount.
pub fn rename(old_path: &str, new_path: &str) -> VfsResult<()> {
    let old_normalized = normalize_path(old_path)?;
    let new_normalized = normalize_path(new_path)?;
    let (old_parent_path, old_name) = split_parent(&old_normalized);
    let (new_parent_path, new_name) = split_parent(&new_normalized);

    let old_parent = resolve_path(old_parent_path)?;
    let new_parent = match resolve_path(new_parent_path) {
        Ok(n) => n,
        Err(e) => {
            unref_node(old_parent);
            return Err(e);
        }
    };

    let (old_mount, new_mount) = {
        let pool = NODES.lock();
        let om = pool.get(old_parent).map(|n| n.mount);
        let nm = pool.get(new_parent).map(|n| n.mount);
        (om, nm)
    };
    let cleanup = |old_parent: NodeId, new_parent: NodeId| {
        unref_node(old_parent);
        unref_node(new_parent);
    };
    let (old_mount, new_mount) = match (old_mount, new_mount) {
        (Ok(a), Ok(b)) => (a, b),
        _ => {
            cleanup(old_parent, new_parent);
            return Err(VfsError::Io);
        }
    };
    if old_mount != new_mount {
        cleanup(old_parent, new_parent);
        return Err(VfsError::InvalidArgument);
    }
    if mount_read_only(old_mount) {
        cleanup(old_parent, new_parent);
        return Err(VfsError::ReadOnlyFilesystem);
    }

    let ops = match mount_ops(old_mount) {
        Ok(o) => o,
        Err(e) => {
            cleanup(old_parent, new_parent);
            return Err(e);
        }
    };
    let (old_snapshot, new_snapshot) = {
        let pool = NODES.lock();
        let a = pool.get(old_parent).map(clone_node_readonly);
        let b = pool.get(new_parent).map(clone_node_readonly);
        (a, b)
    };
    let result = match (old_snapshot, new_snapshot) {
        (Ok(a), Ok(b)) => ops.rename(&a, old_name, &b, new_name),
        _ => Err(VfsError::Io),
    };
    cleanup(old_parent, new_parent);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_dot_dot() {
        assert_eq!(normalize_path("/a/./b/../c").unwrap(), "/a/c");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_path("/a/./b/../c").unwrap();
        let twice = normalize_path(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_never_escapes_root() {
        assert_eq!(normalize_path("/../../..").unwrap(), "/");
        assert_eq!(normalize_path("/a/../../b").unwrap(), "/b");
    }

    #[test]
    fn normalize_empty_is_root() {
        assert_eq!(normalize_path("").unwrap(), "/");
        assert_eq!(normalize_path("/").unwrap(), "/");
    }
}
