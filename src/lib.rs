//! Information-flow control core for a register-based bytecode interpreter:
//! a dispatcher that tracks a confidentiality/integrity label alongside
//! every register and property, enforcing no-sensitive-upgrade at writes
//! and branch-on-taint at control transfers, while the underlying value
//! and object semantics are supplied by a host through the traits in
//! [`host`].

pub mod analysis;
pub mod bytecode;
pub mod config;
pub mod error;
pub mod host;
pub mod label;
pub mod origin;
pub mod pcstack;
pub mod value;
pub mod vm;

pub use error::IfcError;
pub use label::Label;
pub use vm::Transaction;
