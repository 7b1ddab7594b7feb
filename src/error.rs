use anyhow::Error;

/// Startup failures that end the process. There is no runtime-recoverable
/// error class once the pipeline is built.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("window creation failed: {0}")]
    Window(String),
    #[error("no suitable GPU adapter found")]
    Adapter,
    #[error("failed to request GPU device: {0}")]
    Device(String),
    #[error("surface setup failed: {0}")]
    Surface(String),
    #[error("shader '{label}' failed to compile or link: {message}")]
    Shader { label: String, message: String },
    #[error("font loading failed: {0}")]
    Font(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FatalError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Window(_) => "WINDOW_INIT_FAILED",
            Self::Adapter => "GPU_ADAPTER_UNAVAILABLE",
            Self::Device(_) => "GPU_DEVICE_FAILED",
            Self::Surface(_) => "SURFACE_INIT_FAILED",
            Self::Shader { .. } => "SHADER_BUILD_FAILED",
            Self::Font(_) => "FONT_LOAD_FAILED",
            Self::Config(_) => "CONFIG_INVALID",
        }
    }

    /// Process exit status, distinct per failure class.
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Window(_) => 3,
            Self::Adapter => 4,
            Self::Device(_) => 5,
            Self::Surface(_) => 6,
            Self::Shader { .. } => 7,
            Self::Font(_) => 8,
        }
    }
}

/// Generic startup failure without a more specific class.
pub const EXIT_UNCLASSIFIED: i32 = 1;

/// Finds a [`FatalError`] whether it is the root cause or attached as context.
pub fn find_fatal_error(error: &Error) -> Option<&FatalError> {
    error.downcast_ref::<FatalError>().or_else(|| {
        error
            .chain()
            .find_map(|cause| cause.downcast_ref::<FatalError>())
    })
}

pub fn exit_status_for(error: &Error) -> i32 {
    find_fatal_error(error).map_or(EXIT_UNCLASSIFIED, FatalError::exit_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn fatal_error_is_found_through_context_layers() {
        let result: anyhow::Result<()> = Err(FatalError::Adapter.into());
        let error = result
            .context("failed to build pipeline")
            .context("startup")
            .unwrap_err();

        let found = find_fatal_error(&error).expect("fatal error in chain");
        assert_eq!(found.code(), "GPU_ADAPTER_UNAVAILABLE");
        assert_eq!(exit_status_for(&error), 4);
    }

    #[test]
    fn plain_errors_use_unclassified_status() {
        let error = anyhow::anyhow!("something else");
        assert!(find_fatal_error(&error).is_none());
        assert_eq!(exit_status_for(&error), EXIT_UNCLASSIFIED);
    }

    #[test]
    fn exit_statuses_are_distinct() {
        let all = [
            FatalError::Window(String::new()),
            FatalError::Adapter,
            FatalError::Device(String::new()),
            FatalError::Surface(String::new()),
            FatalError::Shader {
                label: String::new(),
                message: String::new(),
            },
            FatalError::Font(String::new()),
            FatalError::Config(String::new()),
        ];
        let mut statuses = all.iter().map(FatalError::exit_status).collect::<Vec<_>>();
        statuses.push(EXIT_UNCLASSIFIED);
        statuses.sort_unstable();
        statuses.dedup();
        assert_eq!(statuses.len(), all.len() + 1);
    }
}
