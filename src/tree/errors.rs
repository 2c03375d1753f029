use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("failed to set language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,

    /// A capability path segment has no accessor on the node it was applied to.
    #[error("{segment} is not supported for {text}")]
    UnresolvedCapability { segment: String, text: String },

    #[error("{path} does not resolve to a range in {text}")]
    EmptyRange { path: String, text: String },
}
