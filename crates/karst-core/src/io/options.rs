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

use serde::{Deserialize, Serialize};

/// The byte range a read request targets within a chunk's logical data.
///
/// An immutable value copied into every request. The default of offset `0`
/// and size [`u64::MAX`] means "the whole chunk" by convention; backends
/// clamp the range to the chunk's actual length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Byte offset into the chunk's logical data.
    pub offset: u64,
    /// Number of bytes to read from `offset`.
    pub size: u64,
}

impl ReadOptions {
    /// Options selecting the entire chunk.
    pub const fn whole_chunk() -> Self {
        Self {
            offset: 0,
            size: u64::MAX,
        }
    }

    /// Options selecting `size` bytes starting at `offset`.
    pub const fn range(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }
}

impl Default for ReadOptions {
    /// Defaults to [`ReadOptions::whole_chunk`].
    fn default() -> Self {
        Self::whole_chunk()
    }
}
