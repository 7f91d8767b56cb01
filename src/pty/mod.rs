pub mod host;
pub mod lifecycle;

pub use host::{PtyError, PtyHost, SpawnOptions};
pub use lifecycle::{ExitStatus, ProcessManager};
