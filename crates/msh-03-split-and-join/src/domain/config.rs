//! Split-and-join configuration.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAndJoinConfig {
    /// Where outbound fragment files are cut and inbound ones are written.
    pub fragments_dir: PathBuf,
    /// Where source messages are rejoined.
    pub work_dir: PathBuf,
    /// Suffix of generated fragment message ids (`<uuid>@<suffix>`).
    pub message_id_suffix: String,
    /// zstd level used when a leg asks for compression.
    pub compression_level: i32,
}

impl Default for SplitAndJoinConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("msh");
        Self {
            fragments_dir: base.join("fragments"),
            work_dir: base.join("rejoin"),
            message_id_suffix: "fragment.msh".to_string(),
            compression_level: 3,
        }
    }
}

impl SplitAndJoinConfig {
    /// All directories under one root.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            fragments_dir: root.join("fragments"),
            work_dir: root.join("rejoin"),
            ..Self::default()
        }
    }
}
