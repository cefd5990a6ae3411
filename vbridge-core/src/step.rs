//! Outcome of a resumable operation.

/// Result of one attempt at a resumable operation.
///
/// `Pending` is the normal "need more input / more output space" exit:
/// the operation keeps its progress and the caller re-invokes the same
/// call after the next I/O readiness event.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<T = ()> {
    /// The operation finished and produced `T`.
    Ready(T),
    /// The operation suspended; call it again later.
    Pending,
}

impl<T> Step<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Step::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Step::Pending)
    }
}

/// Early-return `Ok(Step::Pending)` from a function returning
/// `Result<Step<_>, _>` when the inner operation suspended.
#[macro_export]
macro_rules! ready {
    ($e:expr) => {
        match $e {
            $crate::Step::Ready(v) => v,
            $crate::Step::Pending => return Ok($crate::Step::Pending),
        }
    };
}

/// What one step of a receive machine achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// The message is complete.
    Done,
    /// State changed without completing a message.
    Again,
    /// Read more from the transport, then retry.
    NeedInput,
    /// Wait for the application.
    Blocked,
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn halve(step: Step<u32>) -> Result<Step<u32>, ()> {
        let v = ready!(step);
        Ok(Step::Ready(v / 2))
    }

    #[test]
    fn ready_macro_propagates_pending() {
        assert_eq!(halve(Step::Ready(8)), Ok(Step::Ready(4)));
        assert_eq!(halve(Step::Pending), Ok(Step::Pending));
    }
}
