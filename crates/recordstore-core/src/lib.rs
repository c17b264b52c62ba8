//! Core engine for a typed, self-describing hierarchical record store.
//!
//! This crate provides the foundational pieces for `recordstore`:
//!
//! - A schema-agnostic builder tree of groups, datasets, attributes and soft
//!   links (`builder` module).
//! - Dynamic tables with scalar, ragged and region-reference columns sharing
//!   one row set (`table` module).
//! - Versioned schema namespaces with single inheritance, and a type map
//!   pairing each type with its constructor (`schema` module).
//! - Typed containers and the built-in series, table and file types
//!   (`container` and `containers` modules).
//! - A schema-driven object mapper between containers and builder trees
//!   (`mapper` module).
//! - Store I/O with open modes, atomic commits and a cached copy of the
//!   schema inside every store (`store_io` and `storage` modules).
//!
//! The library logs through the `log` facade and never installs a logger.
#![deny(missing_docs)]
pub mod builder;
pub mod container;
pub mod containers;
pub mod mapper;
pub mod schema;
pub mod storage;
pub mod store_io;
pub mod table;
