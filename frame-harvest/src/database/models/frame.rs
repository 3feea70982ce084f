//! Frame database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored frame. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FrameDbModel {
    pub id: i64,
    /// Path relative to the frames directory, `<category_id>/<N>.<ext>`.
    pub path: String,
    pub category_id: String,
    /// Login of the channel the frame was captured from.
    pub channel_login: String,
    /// Unix epoch milliseconds (UTC) of capture.
    pub captured_at: i64,
}

impl FrameDbModel {
    /// File name component of `path`.
    pub fn file_name(&self) -> &str {
        file_name_of(&self.path)
    }

    /// Frame number encoded in the file name, if any.
    pub fn frame_number(&self) -> Option<u64> {
        frame_number_of(self.file_name())
    }
}

/// A frame about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFrame {
    pub path: String,
    pub category_id: String,
    pub channel_login: String,
    pub captured_at: i64,
}

impl NewFrame {
    pub fn new(
        path: impl Into<String>,
        category_id: impl Into<String>,
        channel_login: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            category_id: category_id.into(),
            channel_login: channel_login.into(),
            captured_at: crate::database::time::now_ms(),
        }
    }
}

/// Last `/`-separated component of a stored frame path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Frame number encoded in a file name such as `17.jpg`. Only positive
/// integer stems count, so `0.jpg`, `cover.jpg` and `4.jpg.part` are not frames.
pub fn frame_number_of(file_name: &str) -> Option<u64> {
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);
    stem.parse::<u64>().ok().filter(|n| *n > 0)
}
