//! Client identity and session markers consumed by the handshake.

/// Application identity sent verbatim in the connection-initialisation
/// request.
///
/// The runtime validates presence of every field before the handshake
/// touches the transport; semantic correctness is the caller's concern.
#[derive(bincode::Decode, bincode::Encode, Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Application identifier issued by the service operator.
    pub api_id: i32,
    /// Hardware model string, e.g. `"PC 64bit"`.
    pub device_model: String,
    /// Operating system version string.
    pub system_version: String,
    /// Application version string.
    pub app_version: String,
    /// Client language code, e.g. `"en"`.
    pub lang_code: String,
    /// Language pack identifier.
    pub lang_pack: String,
    /// System language code.
    pub system_lang_code: String,
}

/// A required identity field is missing or empty.
///
/// This is a configuration error on the caller's side, not a protocol
/// error: the handshake aborts without writing anything to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The application id was left at its default value.
    #[error("application id is unset")]
    MissingApiId,
    /// A descriptive field is empty or whitespace-only.
    #[error("required identity field `{0}` is empty")]
    EmptyField(&'static str),
}

impl ClientIdentity {
    /// Check that every field required by the handshake is present.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] naming the first missing field.
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.api_id == 0 {
            return Err(IdentityError::MissingApiId);
        }
        let fields = [
            ("device_model", &self.device_model),
            ("system_version", &self.system_version),
            ("app_version", &self.app_version),
            ("lang_code", &self.lang_code),
            ("lang_pack", &self.lang_pack),
            ("system_lang_code", &self.system_lang_code),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(IdentityError::EmptyField(name));
            }
        }
        Ok(())
    }
}

/// Marker for whether a previously negotiated session exists.
///
/// A resumed session skips negotiation on channel activation and allows
/// request transmission immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSession {
    /// No persisted credentials; negotiation is required.
    Fresh,
    /// Persisted credentials are present from an earlier connection.
    Resumed,
}

impl ClientSession {
    /// `true` when the session was negotiated before and can be reused.
    #[must_use]
    pub fn is_initialized(self) -> bool { matches!(self, Self::Resumed) }
}
