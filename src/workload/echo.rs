use super::{ResponseFrame, Workload};
use crate::utils::error::WorkloadError;
use bytes::Bytes;
use rand::rngs::StdRng;

/// Line-oriented echo: the server must return every request unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoWorkload;

impl Workload for EchoWorkload {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn folder(&self) -> &'static str {
        "echo"
    }

    fn next_request(&self, client_id: u64, seq: u64, _rng: &mut StdRng) -> Bytes {
        Bytes::from(format!("{}:{}\n", client_id, seq))
    }

    fn response_frame(&self, request: &[u8]) -> ResponseFrame {
        ResponseFrame::Exact(request.len())
    }

    fn check_response(
        &self,
        request: &[u8],
        response: &[u8],
    ) -> Result<(), WorkloadError> {
        if request != response {
            return Err(WorkloadError::Malformed(format!(
                "echo mismatch: sent {:?}, received {:?}",
                String::from_utf8_lossy(request),
                String::from_utf8_lossy(response)
            )));
        }
        Ok(())
    }
}
