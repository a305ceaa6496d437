//! This module provides the Queue implementation of this Crate
//!
//! # Keyed
//! The [`keyed`] Queue is a FIFO-Queue where every Entry carries a unique
//! Key, combining a doubly linked List for the Ordering with a Hash-Index
//! for direct O(1) Access to any Entry. It is useful whenever Work-Items
//! need to be processed in Arrival-Order but may also be cancelled or
//! deduplicated by an Identifier, like Retry-Queues or Scheduler-Run-Queues

pub mod keyed;
