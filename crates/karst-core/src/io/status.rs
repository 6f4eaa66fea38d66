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
use std::fmt;

/// The outcome of a chunk I/O operation.
///
/// A status is *terminal* once it is anything other than [`IoStatus::Unknown`]
/// or [`IoStatus::Pending`]; terminal statuses never change afterwards. The
/// dispatcher never interprets a non-`Ok` terminal status beyond forwarding
/// it: there is no transient/permanent distinction and no retry at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoStatus {
    /// The operation has not been attempted yet. This is the pre-resolution
    /// default of every request and is *not* a completed state.
    Unknown,
    /// The operation finished successfully.
    Ok,
    /// The operation was resolved and its transfer is still running.
    Pending,
    /// The chunk is not present in any mounted store.
    NotFound,
    /// The backend failed while transferring data.
    ReadError,
    /// The backend read data that failed its integrity check.
    CorruptData,
    /// The request described an invalid range or identifier.
    InvalidParameter,
}

impl IoStatus {
    /// Returns `true` only for [`IoStatus::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, IoStatus::Ok)
    }

    /// Returns `true` for any terminal status, success or failure.
    pub fn is_completed(&self) -> bool {
        !matches!(self, IoStatus::Unknown | IoStatus::Pending)
    }
}

impl Default for IoStatus {
    fn default() -> Self {
        IoStatus::Unknown
    }
}

impl fmt::Display for IoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IoStatus::Unknown => "unknown",
            IoStatus::Ok => "ok",
            IoStatus::Pending => "pending",
            IoStatus::NotFound => "not found",
            IoStatus::ReadError => "read error",
            IoStatus::CorruptData => "corrupt data",
            IoStatus::InvalidParameter => "invalid parameter",
        };
        f.write_str(name)
    }
}

/// A tagged union holding either a value or the [`IoStatus`] explaining its
/// absence.
///
/// This is the payload delivered to completion callbacks and returned by
/// request accessors: success carries the value, failure carries the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOr<T> {
    /// The operation succeeded and produced a value.
    Ok(T),
    /// The operation did not produce a value; the status says why.
    Err(IoStatus),
}

impl<T> StatusOr<T> {
    /// Returns `true` if a value is present.
    pub fn is_ok(&self) -> bool {
        matches!(self, StatusOr::Ok(_))
    }

    /// Returns the status of the operation. A present value reports
    /// [`IoStatus::Ok`].
    pub fn status(&self) -> IoStatus {
        match self {
            StatusOr::Ok(_) => IoStatus::Ok,
            StatusOr::Err(status) => *status,
        }
    }

    /// Consumes the union, returning the value if present.
    pub fn ok(self) -> Option<T> {
        match self {
            StatusOr::Ok(value) => Some(value),
            StatusOr::Err(_) => None,
        }
    }

    /// Returns a reference to the value if present.
    pub fn value(&self) -> Option<&T> {
        match self {
            StatusOr::Ok(value) => Some(value),
            StatusOr::Err(_) => None,
        }
    }

    /// Converts into a standard [`Result`].
    pub fn into_result(self) -> Result<T, IoStatus> {
        match self {
            StatusOr::Ok(value) => Ok(value),
            StatusOr::Err(status) => Err(status),
        }
    }
}

impl<T> From<IoStatus> for StatusOr<T> {
    /// Wraps a non-`Ok` status as the error arm. Wrapping [`IoStatus::Ok`]
    /// without a value is a logic error upstream; it is preserved as-is so
    /// the caller can observe it.
    fn from(status: IoStatus) -> Self {
        StatusOr::Err(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_and_pending_are_not_completed() {
        assert!(!IoStatus::Unknown.is_completed());
        assert!(!IoStatus::Pending.is_completed());
        assert!(!IoStatus::Unknown.is_ok());
    }

    #[test]
    fn terminal_statuses_are_completed() {
        for status in [
            IoStatus::Ok,
            IoStatus::NotFound,
            IoStatus::ReadError,
            IoStatus::CorruptData,
            IoStatus::InvalidParameter,
        ] {
            assert!(status.is_completed(), "{status} should be terminal");
        }
        assert!(IoStatus::Ok.is_ok());
        assert!(!IoStatus::NotFound.is_ok());
    }

    #[test]
    fn status_or_delegates_to_tag() {
        let ok: StatusOr<u32> = StatusOr::Ok(7);
        assert!(ok.is_ok());
        assert_eq!(ok.status(), IoStatus::Ok);
        assert_eq!(ok.clone().ok(), Some(7));
        assert_eq!(ok.into_result(), Ok(7));

        let err: StatusOr<u32> = StatusOr::Err(IoStatus::NotFound);
        assert!(!err.is_ok());
        assert_eq!(err.status(), IoStatus::NotFound);
        assert_eq!(err.clone().ok(), None);
        assert_eq!(err.into_result(), Err(IoStatus::NotFound));
    }
}
