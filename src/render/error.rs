#[derive(Debug)]
pub enum RenderError {
    /// Device memory exhausted while allocating a buffer.
    AllocationFailure {
        stage: &'static str,
        bytes: usize,
    },
    /// A group's attributes are missing or mis-sized.
    InvalidScene {
        group: usize,
        reason: &'static str,
    },
    /// A kernel panicked; the frame is discarded.
    DispatchFailure {
        stage: &'static str,
    },
    /// The host handed `rasterize` a wrongly sized output buffer.
    OutputMismatch {
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllocationFailure { stage, bytes } => {
                write!(f, "allocation of {bytes} bytes failed for {stage}")
            }
            Self::InvalidScene { group, reason } => {
                write!(f, "invalid scene group {group}: {reason}")
            }
            Self::DispatchFailure { stage } => {
                write!(f, "dispatch failed at {stage}; frame discarded")
            }
            Self::OutputMismatch { expected, actual } => {
                write!(
                    f,
                    "output buffer holds {actual} bytes, expected {expected}"
                )
            }
        }
    }
}

impl std::error::Error for RenderError {}

impl RenderError {
    /// A failed dispatch only loses the current frame; everything else
    /// requires host intervention.
    pub fn frame_recoverable(&self) -> bool {
        matches!(self, Self::DispatchFailure { .. })
    }
}
