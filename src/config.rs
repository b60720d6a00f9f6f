//! Compile-time constants shared across subsystems.
//!
//! Centralising these here means the core scheduler/process/vfs/net code reads as
//! deliberate, named choices rather than magic numbers scattered through the tree.

/// Number of process table slots (`process::ProcessSlot`).
pub const MAX_PROCESSES: usize = 64;

/// Capacity of the scheduler's ready-queue ring buffer.
pub const READY_QUEUE_CAPACITY: usize = MAX_PROCESSES;

/// Fixed per-process quantum length, in timer ticks, before a preemption.
pub const DEFAULT_QUANTUM_TICKS: u32 = 10;

/// Number of direct child slots kept inline in a PCB before spilling into the
/// overflow list. A process with more live children than this does not lose
/// any of them; the rest are tracked in the overflow list keyed by slot index.
pub const MAX_INLINE_CHILDREN: usize = 8;

/// Kernel stack size handed to every process, in bytes.
pub const KERNEL_STACK_SIZE: usize = 4096 * 4;

/// Number of IDT vectors (fixed by the x86_64 architecture).
pub const IDT_VECTOR_COUNT: usize = 256;

/// Maximum normalized VFS path length, in bytes. Longer paths are rejected
/// with `VfsError::NameTooLong` rather than silently truncated.
pub const MAX_PATH_LEN: usize = 1024;

/// Maximum number of path components considered during resolution (bounds
/// `..`/`.` walk work so a pathological path cannot loop the resolver).
pub const MAX_PATH_COMPONENTS: usize = 64;

/// Maximum number of mounts the VFS mount table can hold.
pub const MAX_MOUNTS: usize = 16;

/// Maximum number of live VFS nodes (files + directories) tracked by the node pool.
pub const MAX_VFS_NODES: usize = 512;

/// Maximum number of simultaneously open file handles, across all processes.
pub const MAX_OPEN_FILES: usize = 256;

/// Maximum number of simultaneously open directory handles.
pub const MAX_OPEN_DIRS: usize = 64;

/// Maximum number of UDP sockets that can be bound at once.
pub const MAX_UDP_SOCKETS: usize = 32;

/// Per-socket bounded receive queue depth, in datagrams.
pub const UDP_RECV_QUEUE_CAPACITY: usize = 16;

/// Maximum UDP payload this kernel will buffer for a single datagram.
pub const UDP_MAX_PAYLOAD: usize = 1472; // Ethernet MTU 1500 - IPv4(20) - UDP(8)

/// First port handed out by ephemeral port allocation (IANA dynamic/private range).
pub const EPHEMERAL_PORT_BASE: u16 = 49152;

/// Last port handed out by ephemeral port allocation, inclusive.
pub const EPHEMERAL_PORT_MAX: u16 = 65535;

/// DHCP retry budget before the client gives up and reports failure.
pub const DHCP_MAX_RETRIES: u32 = 4;

/// DHCP initial retransmission timeout, in milliseconds (doubles on each retry).
pub const DHCP_INITIAL_TIMEOUT_MS: u64 = 4_000;

/// Monotonic tick unit used by `mm::timer` and `net::dhcp`: one tick is one millisecond.
pub const TICK_UNIT_MS: u64 = 1;
