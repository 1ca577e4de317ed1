//! Recorder configuration.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonRepudiationConfig {
    /// Master switch. When off, nothing is read or written.
    pub audit_active: bool,
    /// Envelopes larger than this are not recorded.
    pub max_envelope_bytes: usize,
}

impl Default for NonRepudiationConfig {
    fn default() -> Self {
        Self {
            audit_active: true,
            max_envelope_bytes: 64 * 1024 * 1024,
        }
    }
}

impl NonRepudiationConfig {
    pub fn disabled() -> Self {
        Self {
            audit_active: false,
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            max_envelope_bytes: 1024,
            ..Self::default()
        }
    }
}
