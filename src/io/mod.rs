//! External I/O seams: positional file access and background work queues

pub mod file;
pub mod work_queue;

pub use file::{DiskFileSystem, FileSystem, MemoryFileSystem, PackFile};
pub use work_queue::{
    BlockingQueue, ImmediateQueue, Job, ManualQueue, ThreadPoolQueue, WorkQueue,
};
