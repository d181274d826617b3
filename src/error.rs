use std::time::Duration;

use thiserror::Error;

/// Errors raised by the outbound HTTP clients (vision, nutrient lookup, messaging).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("could not parse {service} response: {reason}")]
    Parse {
        service: &'static str,
        reason: String,
    },

    #[error("{service} did not answer within {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl ClientError {
    pub fn parse(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            service,
            reason: reason.into(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Runs `fut` under a hard ceiling, mapping expiry to [`ClientError::Timeout`].
pub async fn with_timeout<T, F>(service: &'static str, after: Duration, fut: F) -> ClientResult<T>
where
    F: std::future::Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(ClientError::Timeout { service, after }),
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_maps_elapsed_to_timeout() {
        let err = with_timeout("vision", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ClientError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Timeout { service: "vision", .. }));
        assert!(err.to_string().contains("vision"));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_result() {
        let v = with_timeout("usda", Duration::from_secs(1), async { Ok::<_, ClientError>(7) })
            .await
            .unwrap();
        assert_eq!(v, 7);
    }
}
