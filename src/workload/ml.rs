use super::{ResponseFrame, Workload};
use crate::utils::error::WorkloadError;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::Rng;

/// Predictions returned per inference batch
const PREDICTIONS: usize = 20;
const RESPONSE_LEN: usize = PREDICTIONS * 4;
const MAX_BATCH_INDEX: u32 = 9999;

/// Inference server: the client names a batch index, the server replies with
/// one `i32` digit class per image in that batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineLearningWorkload;

impl Workload for MachineLearningWorkload {
    fn name(&self) -> &'static str {
        "ml"
    }

    fn folder(&self) -> &'static str {
        "machine_learning"
    }

    fn next_request(&self, _client_id: u64, _seq: u64, rng: &mut StdRng) -> Bytes {
        let batch = rng.gen_range(0..=MAX_BATCH_INDEX);
        Bytes::from(batch.to_string())
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

        for chunk in response.chunks_exact(4) {
            let class = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if !(0..=9).contains(&class) {
                return Err(WorkloadError::Malformed(format!(
                    "prediction {} is not a digit class",
                    class
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn predictions(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn request_is_decimal_batch_index() {
        let mut rng = StdRng::seed_from_u64(7);
        for seq in 0..100 {
            let request = MachineLearningWorkload.next_request(0, seq, &mut rng);
            let index: u32 = std::str::from_utf8(&request).unwrap().parse().unwrap();
            assert!(index <= MAX_BATCH_INDEX);
        }
    }

    #[test]
    fn accepts_digit_predictions() {
        let response = predictions(&[3; PREDICTIONS]);
        assert!(MachineLearningWorkload.check_response(b"1", &response).is_ok());
    }

    #[test]
    fn rejects_short_or_out_of_range_predictions() {
        let short = predictions(&[1; 4]);
        assert_eq!(
            MachineLearningWorkload.check_response(b"1", &short),
            Err(WorkloadError::Length {
                expected: RESPONSE_LEN,
                actual: 16
            })
        );

        let mut values = [0; PREDICTIONS];
        values[5] = 42;
        let bad = predictions(&values);
        assert!(matches!(
            MachineLearningWorkload.check_response(b"1", &bad),
            Err(WorkloadError::Malformed(_))
        ));
    }
}
