/// A frame that could not be turned into a message, or the reverse.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[cfg(feature = "json")]
    #[error("could not encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Bad JSON, a missing field, an unknown `type` tag, or a payload the
    /// puzzle cannot parse.
    #[cfg(feature = "json")]
    #[error("could not decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Well-formed but unusable here, e.g. a blank room id.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
