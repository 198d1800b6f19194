//! Binary Retargeting Engine
//!
//! This crate retargets the test-generation logic of a compiled reference
//! unit at a structurally compatible submission unit:
//! - Unit pools (hierarchical unit registries with provenance tracking)
//! - Generator mirrors (generation code redirected at a target unit)
//! - Open mirrors (renamed copies with finality stripped)
//! - Member access verification of generation code
//! - Link checking of synthesized units
//! - Runtime objects and forwarding proxies

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod link;
pub mod mirror;
pub mod object;
pub mod pool;
pub mod provider;
pub mod proxy;
pub mod value;
pub mod verify;

pub use config::{ConfigError, PoolConfig};
pub use error::{RetargetError, Result};
pub use link::LinkError;
pub use mirror::{
    build_generator_mirror, build_generator_mirror_with_prefix, build_open_mirror,
    build_open_mirror_with_prefix, MirrorError, RenameTable,
};
pub use object::{Behavior, Instance, NativeMethod, Object, RuntimeError};
pub use pool::{LoadedUnit, PoolError, PoolId, UnitPool};
pub use provider::{DirectoryProvider, MemoryProvider, UnitProvider, UNIT_EXTENSION};
pub use proxy::{make_proxy, proxy_forwardee, CallHandler, Proxy, ProxyError, ProxyInstantiator};
pub use value::{ObjectRef, Value};
pub use verify::{verify, BytecodeAccessViolation, Member, VerifyError, ViolationReport};
