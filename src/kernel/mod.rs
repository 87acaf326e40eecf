//! Kernel Package Management Module
//!
//! Turns package cache entries into kernel records and acts on them:
//! - Version normalization and ordering
//! - Kernel classification, grouping and space accounting
//! - Support windows per kernel series
//! - Blacklist filtering
//! - Expansion of kernel actions into installer operations

pub mod version;
pub mod debversion;

pub mod manager;
pub mod support;
pub mod blacklist;
pub mod dispatcher;

pub use blacklist::{apply_blacklist, load_blacklist, parse_blacklist};
pub use dispatcher::{perform_kernels, PackageSelection};
pub use manager::{get_kernels, group_kernels, KernelManager, ScanOptions};
pub use support::{load_support_table, support_status};
pub use version::{compare_versions, strip_kernel_version};
