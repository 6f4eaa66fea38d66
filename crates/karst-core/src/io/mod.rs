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

//! I/O value types and the backend contract.
//!
//! Everything here is either a small immutable value copied into each read
//! request ([`ReadOptions`], [`IoStatus`]) or part of the boundary between
//! the dispatcher and the component that actually maps chunk identifiers to
//! bytes ([`ChunkBackend`]).

pub mod backend;
mod buffer;
mod options;
mod status;

pub use backend::{
    ChunkBackend, CompletedBlock, MountEnvironment, RequestToken, Resolution, ResolveRequest,
};
pub use buffer::ChunkBuffer;
pub use options::ReadOptions;
pub use status::{IoStatus, StatusOr};
