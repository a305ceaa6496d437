#![deny(missing_docs)]
#![warn(rust_2018_idioms, missing_debug_implementations)]
//! This crate provides a thread-safe keyed FIFO-Queue
//!
//! A keyed Queue behaves like a normal FIFO-Queue, but every Entry is also
//! stored under a unique Key. This allows two things a plain Queue can not
//! do:
//! * Enqueueing a Key that is already present is detected and rejected in
//!   O(1), without touching the existing Entry
//! * Any Entry can be removed directly by its Key in O(1), no matter where
//!   in the Queue it currently sits
//!
//! All Operations are atomic and the Queue can be freely shared between
//! Threads, see the [`queue::keyed`] Module-Documentation for the Details
//! of the Concurrency-Behaviour.

pub mod queue;

pub use queue::keyed::KeyedQueue;
