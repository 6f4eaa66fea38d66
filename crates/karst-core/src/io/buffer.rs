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

use std::{ops::Deref, sync::Arc};

/// A thread-safe, reference-counted, immutable byte buffer.
///
/// This is the payload of a successful chunk read. Cloning is cheap: it only
/// increments the reference count, so the same completed read can be handed
/// to a completion callback and later re-observed through request accessors
/// without copying the data.
#[derive(Debug, Clone)]
pub struct ChunkBuffer(Arc<[u8]>);

impl ChunkBuffer {
    /// An empty buffer.
    pub fn empty() -> Self {
        Self(Arc::from([]))
    }

    /// Freezes owned bytes into a shared buffer.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }

    /// Returns the buffer contents as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns the number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for ChunkBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for ChunkBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

impl PartialEq for ChunkBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ChunkBuffer {}
