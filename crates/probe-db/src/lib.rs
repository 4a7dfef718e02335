//! Principal provisioning: a short-lived database role scoped to one task.

pub mod provisioner;

pub use provisioner::{PrincipalHandle, ProvisionError, Provisioner};
