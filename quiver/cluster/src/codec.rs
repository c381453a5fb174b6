//! Length-prefixed binary frames over a stream, the same layout as WAL
//! records: `[u32 len][u32 crc32][payload]`, payload postcard-encoded.

use std::io::{Read, Write};

use crc32fast::Hasher;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ClusterError, ClusterResult};

const MAX_FRAME: u32 = 16 << 20;

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> ClusterResult<()> {
    let payload =
        postcard::to_allocvec(message).map_err(|e| ClusterError::EncodeFailed(e.to_string()))?;
    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let checksum = hasher.finalize();
    let len = payload.len() as u32;
    if len > MAX_FRAME {
        return Err(ClusterError::FrameTooLarge(len));
    }
    let mut data = Vec::with_capacity(8 + payload.len());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&checksum.to_le_bytes());
    data.extend_from_slice(&payload);
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> ClusterResult<T> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let len = u32::from_le_bytes(header[..4].try_into().unwrap());
    let checksum = u32::from_le_bytes(header[4..].try_into().unwrap());
    if len > MAX_FRAME {
        return Err(ClusterError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    let mut hasher = Hasher::new();
    hasher.update(&payload);
    if hasher.finalize() != checksum {
        return Err(ClusterError::ChecksumMismatch);
    }
    postcard::from_bytes(&payload).map_err(|e| ClusterError::DecodeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use quiver_common::types::TxnId;
    use quiver_storage::StateDelta;

    use super::*;
    use crate::message::Request;

    #[test]
    fn frames_round_trip() {
        let request = Request::Update {
            delta: StateDelta::TransactionBegin { tx: TxnId::new(42) },
        };
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &request).unwrap();
        let decoded: Request = read_frame(&mut buffer.as_slice()).unwrap();
        match decoded {
            Request::Update {
                delta: StateDelta::TransactionBegin { tx },
            } => assert_eq!(tx, TxnId::new(42)),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn corrupted_frame_is_rejected() {
        let request = Request::StopWorker;
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &request).unwrap();
        let last = buffer.len() - 1;
        buffer[last] ^= 0xFF;
        let result: ClusterResult<Request> = read_frame(&mut buffer.as_slice());
        assert!(matches!(result, Err(ClusterError::ChecksumMismatch)));
    }
}
