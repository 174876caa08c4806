//! Error kinds shared by the naming and storage servers.

use std::io;

/// Convenient result alias used by all DFS operations.
pub type DfsResult<T> = Result<T, DfsError>;

/// Failure kinds surfaced across the service boundary.
///
/// Storage hosts report local failures as [`DfsError::Io`] or
/// [`DfsError::NotFound`]; the naming server relays them to clients
/// unchanged. Failures of cross-server calls surface as
/// [`DfsError::Remote`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DfsError {
    /// The path does not exist or names the wrong kind of node.
    NotFound,
    /// Malformed path or component, or an unlock that matches no held lock.
    Argument,
    /// Byte range outside the current file contents.
    OutOfRange,
    /// Local filesystem failure on a storage host.
    Io,
    /// Transport failure on a cross-server call.
    Remote,
    /// Protocol violation: duplicate stub at registration, no storage
    /// servers available, or a replica delete reporting false.
    State,
}

/// Map a host `io::Error` to the closest service error kind.
pub fn map_io_error(err: io::Error) -> DfsError {
    match err.kind() {
        io::ErrorKind::NotFound => DfsError::NotFound,
        _ => DfsError::Io,
    }
}
