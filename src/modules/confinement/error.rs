use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfinementError {
    #[error("You are not allowed to use this command.")]
    Unauthorized,
    #[error("That member is not in a voice channel.")]
    NotInChannel,
    #[error("No voice channel named **{0}** exists in this server.")]
    NoHoldingChannel(String),
    #[error("That member is not confined.")]
    NotConfined,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Discord rejected the request: {0}")]
    Transport(String),
}

impl ConfinementError {
    /// Informational outcomes are shown without the failure marker.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::NotConfined)
    }

    pub fn render(&self) -> String {
        if self.is_informational() {
            format!("ℹ️ {}", self)
        } else {
            format!("❌ {}", self)
        }
    }
}
