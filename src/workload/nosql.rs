use super::{ResponseFrame, Workload};
use crate::utils::error::WorkloadError;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::Rng;

const RESPONSE_LEN: usize = 4;

/// Key-value store: two ASCII digits select the operation and the record
/// value, the server answers with a single `i32` result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSqlWorkload;

impl Workload for NoSqlWorkload {
    fn name(&self) -> &'static str {
        "nosql"
    }

    fn folder(&self) -> &'static str {
        "no_sql_db"
    }

    fn next_request(&self, _client_id: u64, _seq: u64, rng: &mut StdRng) -> Bytes {
        let work: u8 = rng.gen_range(0..=9);
        let value: u8 = rng.gen_range(0..=9);
        Bytes::from(vec![b'0' + work, b'0' + value])
    }

    fn response_frame(&self, _request: &[u8]) -> ResponseFrame {
        ResponseFrame::Exact(RESPONSE_LEN)
    }

    fn check_response(
        &self,
        _request: &[u8],
        response: &[u8],
    ) -> Result<(), WorkloadError> {
        if response.len() != RESPONSE_LEN {
            return Err(WorkloadError::Length {
                expected: RESPONSE_LEN,
                actual: response.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn request_is_two_digits() {
        let mut rng = StdRng::seed_from_u64(1);
        let request = NoSqlWorkload.next_request(3, 0, &mut rng);
        assert_eq!(request.len(), 2);
        assert!(request.iter().all(u8::is_ascii_digit));
    }

    #[test]
    fn response_must_be_one_int() {
        assert!(NoSqlWorkload.check_response(b"12", &7i32.to_le_bytes()).is_ok());
        assert!(NoSqlWorkload.check_response(b"12", &[0u8; 3]).is_err());
    }
}
