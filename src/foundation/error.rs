use std::time::Duration;

pub type Mp3ifyResult<T> = Result<T, Mp3ifyError>;

#[derive(thiserror::Error, Debug)]
pub enum Mp3ifyError {
    #[error("engine load error: {0}")]
    Load(String),

    #[error("invalid share link: {0}")]
    InvalidUrlFormat(String),

    #[error("download failed with HTTP status {status}")]
    DownloadFailed { status: u16 },

    #[error("no input selected: please select a video file first")]
    NoInputSelected,

    #[error("conversion error: {0}")]
    Convert(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a conversion is already in progress")]
    Busy,

    #[error("conversion timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("conversion cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Mp3ifyError {
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrlFormat(url.into())
    }

    pub fn convert(msg: impl Into<String>) -> Self {
        Self::Convert(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            Mp3ifyError::load("x")
                .to_string()
                .contains("engine load error:")
        );
        assert!(
            Mp3ifyError::invalid_url("x")
                .to_string()
                .contains("invalid share link:")
        );
        assert!(
            Mp3ifyError::convert("x")
                .to_string()
                .contains("conversion error:")
        );
        assert!(
            Mp3ifyError::invalid_input("x")
                .to_string()
                .contains("invalid input:")
        );
        assert!(
            Mp3ifyError::config("x")
                .to_string()
                .contains("config error:")
        );
    }

    #[test]
    fn download_failed_reports_status() {
        let err = Mp3ifyError::DownloadFailed { status: 403 };
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn timeout_reports_seconds() {
        let err = Mp3ifyError::TimedOut(Duration::from_secs(90));
        assert_eq!(err.to_string(), "conversion timed out after 90s");
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = Mp3ifyError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
