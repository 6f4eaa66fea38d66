// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a [`ChunkId`] in bytes.
pub const CHUNK_ID_LEN: usize = 12;

/// A fixed-width, opaque identifier for a unit of storable data.
///
/// Equality and hashing are defined over the raw bytes. The all-zero value
/// is reserved as the invalid sentinel ([`ChunkId::INVALID`]); backends must
/// never contain a chunk under that identifier.
///
/// A `ChunkId` is decoupled from any physical location: how identifiers are
/// derived from source content is the concern of whoever packs the data,
/// not of this crate.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct ChunkId([u8; CHUNK_ID_LEN]);

impl ChunkId {
    /// The reserved "no chunk" sentinel (all-zero bytes).
    pub const INVALID: ChunkId = ChunkId([0; CHUNK_ID_LEN]);

    /// Creates a `ChunkId` from raw bytes.
    pub const fn from_bytes(bytes: [u8; CHUNK_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the identifier.
    pub const fn as_bytes(&self) -> &[u8; CHUNK_ID_LEN] {
        &self.0
    }

    /// Returns `true` unless this is the reserved invalid sentinel.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for ChunkId {
    /// Defaults to the invalid sentinel.
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
