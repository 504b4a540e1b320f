//! # Exec Event Decoding
//!
//! Parses raw buffer records against the fixed little-endian layout shared
//! with the eBPF programs (see [`execwatch_common`]). Records are decoded
//! field by field from bytes, never by casting the buffer, so short or
//! malformed records become [`DecodeError`]s instead of undefined behaviour.
//!
//! Records longer than the layout are accepted: perf buffers pad raw samples
//! to 8-byte boundaries and the padding is ignored.

use execwatch_common::{
    COMM_OFFSET, EXEC_EVENT_SIZE, FILENAME_LEN_OFFSET, FILENAME_OFFSET, MAX_FILENAME_LEN,
    PID_OFFSET, TASK_COMM_LEN,
};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use crate::capture::RawEventRecord;
use crate::domain::{CpuId, DecodeError, Pid};

/// A decoded exec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExecEvent {
    pub pid: Pid,
    /// Command name, cut at the first NUL
    pub comm: String,
    /// Executable path, exactly `filename_len` bytes of the record
    pub filename: PathBuf,
    /// CPU the record was delivered on, per-CPU buffers only
    pub cpu: Option<CpuId>,
}

/// Decode a record and carry over its delivery CPU
///
/// # Errors
/// Returns an error if the payload is truncated or its filename length is out of range
pub fn decode_record(record: &RawEventRecord) -> Result<ProcessExecEvent, DecodeError> {
    let mut event = decode_exec_event(&record.payload)?;
    event.cpu = record.cpu;
    Ok(event)
}

/// Decode one exec event payload
///
/// # Errors
/// Returns an error if the payload is truncated or its filename length is out of range
pub fn decode_exec_event(payload: &[u8]) -> Result<ProcessExecEvent, DecodeError> {
    if payload.len() < EXEC_EVENT_SIZE {
        return Err(DecodeError::Truncated { expected: EXEC_EVENT_SIZE, actual: payload.len() });
    }

    let pid = u32::from_le_bytes(field(payload, PID_OFFSET));
    let filename_len = i32::from_le_bytes(field(payload, FILENAME_LEN_OFFSET));

    let len = usize::try_from(filename_len)
        .ok()
        .filter(|len| *len <= MAX_FILENAME_LEN)
        .ok_or(DecodeError::FilenameLength { len: filename_len, capacity: MAX_FILENAME_LEN })?;

    let comm = until_nul(&payload[COMM_OFFSET..COMM_OFFSET + TASK_COMM_LEN]);
    let filename = &payload[FILENAME_OFFSET..FILENAME_OFFSET + len];

    Ok(ProcessExecEvent {
        pid: Pid(pid),
        comm: String::from_utf8_lossy(comm).into_owned(),
        filename: PathBuf::from(OsStr::from_bytes(filename)),
        cpu: None,
    })
}

fn field<const N: usize>(payload: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&payload[offset..offset + N]);
    out
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(pid: u32, comm: &[u8], filename: &[u8], filename_len: i32) -> Vec<u8> {
        let mut buf = vec![0u8; EXEC_EVENT_SIZE];
        buf[PID_OFFSET..PID_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
        buf[COMM_OFFSET..COMM_OFFSET + comm.len()].copy_from_slice(comm);
        buf[FILENAME_OFFSET..FILENAME_OFFSET + filename.len()].copy_from_slice(filename);
        buf[FILENAME_LEN_OFFSET..FILENAME_LEN_OFFSET + 4]
            .copy_from_slice(&filename_len.to_le_bytes());
        buf
    }

    #[test]
    fn test_decode_exec_event() {
        let event = decode_exec_event(&encode(4242, b"bash", b"/bin/ls", 7)).unwrap();

        assert_eq!(event.pid, Pid(4242));
        assert_eq!(event.comm, "bash");
        assert_eq!(event.filename, PathBuf::from("/bin/ls"));
        assert_eq!(event.cpu, None);
    }

    #[test]
    fn test_filename_len_limits_path() {
        // Bytes past filename_len are not part of the path, even without a NUL
        let event = decode_exec_event(&encode(1, b"sh", b"/usr/bin/env", 8)).unwrap();
        assert_eq!(event.filename, PathBuf::from("/usr/bin"));
    }

    #[test]
    fn test_full_width_fields() {
        let comm = [b'x'; TASK_COMM_LEN];
        let filename = [b'a'; MAX_FILENAME_LEN];
        let event = decode_exec_event(&encode(7, &comm, &filename, 512)).unwrap();

        assert_eq!(event.comm.len(), TASK_COMM_LEN);
        assert_eq!(event.filename.as_os_str().len(), MAX_FILENAME_LEN);
    }

    #[test]
    fn test_filename_len_over_capacity() {
        let err = decode_exec_event(&encode(1, b"sh", b"/bin/sh", 513)).unwrap_err();
        assert_eq!(err, DecodeError::FilenameLength { len: 513, capacity: MAX_FILENAME_LEN });
    }

    #[test]
    fn test_negative_filename_len() {
        let err = decode_exec_event(&encode(1, b"sh", b"/bin/sh", -1)).unwrap_err();
        assert!(matches!(err, DecodeError::FilenameLength { len: -1, .. }));
    }

    #[test]
    fn test_truncated_record() {
        let payload = encode(1, b"sh", b"/bin/sh", 7);
        let err = decode_exec_event(&payload[..EXEC_EVENT_SIZE - 1]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated { expected: EXEC_EVENT_SIZE, actual: EXEC_EVENT_SIZE - 1 }
        );
    }

    #[test]
    fn test_padded_record() {
        let mut payload = encode(9, b"init", b"/sbin/init", 10);
        payload.extend_from_slice(&[0u8; 4]);
        let event = decode_exec_event(&payload).unwrap();
        assert_eq!(event.filename, PathBuf::from("/sbin/init"));
    }

    #[test]
    fn test_non_utf8_filename_is_preserved() {
        let event = decode_exec_event(&encode(3, b"sh", b"/tmp/\xff", 6)).unwrap();
        assert_eq!(event.filename.as_os_str().as_bytes(), b"/tmp/\xff");
    }

    #[test]
    fn test_decode_record_keeps_cpu() {
        let record = RawEventRecord::new(encode(5, b"cat", b"/bin/cat", 8)).with_cpu(CpuId(3));
        let event = decode_record(&record).unwrap();
        assert_eq!(event.cpu, Some(CpuId(3)));
    }
}
