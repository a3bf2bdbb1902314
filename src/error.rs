/// Errors surfaced by the core runtime.
///
/// `BadProcessor` and `NotReady` are recoverable and come back through
/// `Result`s on the user-facing API. `ProtocolDesync` and `TransportFailure`
/// are fatal to the job: `sync` aborts the processor when it hits one.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// An image index was outside `0..active_processors()`.
    BadProcessor { pe: usize, num_pes: usize },
    /// A future was read before the superstep that fulfils it completed.
    NotReady,
    /// An operation was issued against a world that has been torn down.
    WorldGone,
    /// An incoming frame referenced state this processor does not have,
    /// which means the processors disagree on collective construction order.
    ProtocolDesync(String),
    /// The fabric failed to move bytes; a peer is gone or the job is wedged.
    TransportFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadProcessor { pe, num_pes } => {
                write!(f, "invalid processor id {} (active processors: {})", pe, num_pes)
            }
            Error::NotReady => {
                write!(f, "future read before the superstep delivering it completed")
            }
            Error::WorldGone => write!(f, "world has been terminated"),
            Error::ProtocolDesync(what) => {
                write!(f, "collective protocol desync: {}", what)
            }
            Error::TransportFailure(what) => write!(f, "transport failure: {}", what),
        }
    }
}

impl std::error::Error for Error {}

/// Abort the processor on an unrecoverable error. Protocol desyncs and
/// transport failures have no local recovery: the job as a whole is failed.
pub(crate) fn fatal(err: Error) -> ! {
    tracing::error!("{}", err);
    panic!("{}", err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_processor() {
        let err = Error::BadProcessor { pe: 7, num_pes: 4 };
        assert_eq!(
            err.to_string(),
            "invalid processor id 7 (active processors: 4)"
        );
    }
}
