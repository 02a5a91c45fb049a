//! Reference resolution and section outlining for trees of markup documents.
//!
//! A [`tree::DocumentTreeRoot`] goes in, [`resolver::resolve`] rewrites every
//! reference into a resolved node or an invalid-element placeholder, builds
//! nested sections from flat headers, and reports one
//! [`diagnostics::Diagnostic`] per placeholder. The markdown loader, directory
//! scanner and CLI commands live alongside as the outer surfaces.

pub mod ast;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod markdown;
pub mod numbering;
pub mod outline;
pub mod path;
pub mod resolver;
pub mod rewrite;
pub mod scanner;
pub mod tree;
pub mod watch;

pub use resolver::{Resolution, resolve};
