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

use thiserror::Error;

/// Errors returned by the public dispatcher surface.
///
/// These cover misuse of handles, not I/O failures: a failed read is
/// reported through [`karst_core::IoStatus`] on the request itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The batch behind this handle has already been freed.
    #[error("batch handle is stale; the batch was already freed")]
    StaleBatch,
    /// The batch was already issued; its request list is frozen.
    #[error("batch was already issued")]
    BatchAlreadyIssued,
    /// The batch has not been issued, so waiting on it would never return.
    #[error("batch has not been issued")]
    BatchNotIssued,
    /// Cancellation is an explicitly absent feature of this dispatcher.
    #[error("request cancellation is not implemented")]
    Unimplemented,
}

/// Result alias for fallible dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
