mod client;
mod log;
mod raw;
mod server;
mod service;

pub use client::{ClientConfig, FilePermissions, OwnerRef, SftpdConfig};
pub use log::{LogLevel, SinkConfig};
pub use raw::{
    RawClientConfig, RawClientConn, RawFilePermissions, RawOwnerRef, RawServerConfig,
    RawServiceDef, RawSftpdConfig,
};
pub use server::{
    ClientConnection, PushMode, RenewConfig, RenewUnit, ServerConfig, TimeOfDay,
};
pub use service::{ServiceKind, UnitAction};
