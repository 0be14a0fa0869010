use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Started,
    Streaming,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Started => "STARTED",
            SessionState::Streaming => "STREAMING",
            SessionState::Stopped => "STOPPED",
        }
    }

    /// Whether the session still accepts audio or a stop request.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Started | SessionState::Streaming)
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Idle, SessionState::Started)
                | (SessionState::Started, SessionState::Streaming)
                | (SessionState::Streaming, SessionState::Streaming)
                | (SessionState::Started, SessionState::Stopped)
                | (SessionState::Streaming, SessionState::Stopped)
                | (SessionState::Idle, SessionState::Stopped)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
