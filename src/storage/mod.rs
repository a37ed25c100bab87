//! File system storage management
//!
//! Maps the client's virtual paths into the server root and performs the
//! file operations behind the FTP commands.

pub mod operations;
pub mod validation;

pub use operations::unique_path;
pub use validation::{ensure_within_root, resolve_path, resolve_virtual, virtual_to_real_path};
