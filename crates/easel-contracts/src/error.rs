/// Local failures raised before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("Please enter a description for your image")]
    EmptyPrompt,

    #[error("Unknown style '{0}'")]
    StyleNotFound(String),

    #[error("Style catalog could not be parsed: {0}")]
    InvalidCatalog(String),
}
