//! Rill Core
//!
//! This crate provides the core of the Rill fine-grained reactive runtime.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - An ownership tree for structured disposal and error propagation
//! - A glitch-free synchronous scheduler with two-phase flushing
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: Public primitives and the thread-local scheduler
//! - `graph`: Dependency-graph storage (node arena, edge bookkeeping)
//!
//! # Example
//!
//! ```rust,ignore
//! use rill_core::reactive::{Effect, Memo, Signal};
//!
//! let count = Signal::new(0);
//!
//! let doubled = {
//!     let count = count.clone();
//!     Memo::new(move |_| count.get() * 2)
//! };
//!
//! let _logger = {
//!     let doubled = doubled.clone();
//!     Effect::new(move || println!("doubled = {}", doubled.get()))
//! };
//!
//! count.set(21); // prints "doubled = 42"
//! ```
//!
//! All state lives in a thread-local runtime; handles are `!Send` and the
//! whole system is single-threaded by construction.

pub mod graph;
pub mod reactive;
