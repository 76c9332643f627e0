use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiskWarmerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    BadArgument(String),
    #[error("failed to open device {path}: {source}")]
    DeviceOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("device probe failed: {0}")]
    DeviceProbe(&'static str),
    #[error("async backend initialization failed: {0}")]
    BackendInit(&'static str),
    #[error("submit returned fewer requests than expected ({got}/{expected})")]
    Submit { got: usize, expected: usize },
    #[error("reap returned fewer completions than expected ({got}/{expected})")]
    Reap { got: usize, expected: usize },
}
