//! Container runtime boundary: snapshots and lifecycle events.

pub mod docker;
pub mod runtime;
pub mod types;

pub use docker::DockerRuntime;
pub use runtime::ContainerRuntime;
pub use runtime::RuntimeError;
pub use runtime::RuntimeManager;
pub use types::ContainerEvent;
pub use types::ContainerEventKind;
pub use types::ContainerInfo;
pub use types::NetworkInfo;
