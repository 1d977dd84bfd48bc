// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DNS wire protocol (RFC 1035 + mDNS extensions)
//!
//! Typed message model and the byte-level codec. Layering rule:
//!
//! ```text
//! ALLOWED:   engine/sd/catalog -> protocol::*
//! FORBIDDEN: protocol -> anything above it
//! ```
//!
//! The QU question bit and the cache-flush record bit exist only at this
//! boundary; they are stripped into booleans on decode and re-applied on
//! encode, so upper layers always see normalized class values.

pub mod message;
pub mod name;
pub mod record;
pub mod wire;

pub use message::{Flags, Message, Question};
pub use name::{DomainName, NameError};
pub use record::{
    reverse_lookup_name, RData, RecordType, ResourceRecord, CLASS_CACHE_FLUSH_BIT, CLASS_IN,
    CLASS_QU_BIT,
};
pub use wire::{decode, encode, encode_bounded, WireError};
