//! Thin façade over the message-passing context a bulk store runs in.
//!
//! The core never initializes or tears down a parallel runtime; it receives a
//! [`Communicator`] value at construction and uses it only for the two
//! collective steps of a modification cycle (cycle-counter sanity check and
//! global identifier numbering). Messages are contiguous byte slices; all
//! handles are waitable but non-blocking.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::mesh_error::MeshBulkError;

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of the local process in the communicator.
    fn rank(&self) -> usize;
    /// Number of processes in the communicator.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for single-process runs and serial unit tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- LocalComm: in-process mailbox, one "rank" per thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, Bytes>> = Lazy::new(DashMap::new);

/// Receive handle for [`LocalComm`]; resolves once the matching send lands.
pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let mut guard = self.buf.lock().ok()?;
        guard.take()
    }
}

/// In-process mailbox communicator for multi-"rank" tests on threads.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
}

impl LocalComm {
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank must be below size");
        Self { rank, size }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        MAILBOX.insert(key, Bytes::from(buf.to_vec()));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalHandle {
        let key = (peer, self.rank, tag);
        let buf_arc = Arc::new(Mutex::new(None));
        let buf_arc_clone = buf_arc.clone();
        let buf_len = buf.len();
        let handle = std::thread::spawn(move || {
            loop {
                if let Some(bytes) = MAILBOX.remove(&key).map(|(_, v)| v) {
                    if let Ok(mut guard) = buf_arc_clone.lock() {
                        *guard = Some(bytes[..buf_len].to_vec());
                    }
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf: buf_arc,
            handle: Some(handle),
        }
    }
}

/// All-to-all exchange of one `u64` per rank.
///
/// Returns a vector indexed by rank, with `value` at the local rank's slot.
/// This is the only collective shape the modification protocol needs: the
/// cycle-counter sanity check and the exclusive scan for identifier blocks
/// are both built on it.
///
/// # Errors
/// [`MeshBulkError::CollectiveExchangeFailed`] if a peer's contribution never
/// arrives.
pub fn exchange_u64<C: Communicator>(
    comm: &C,
    tag: u16,
    value: u64,
) -> Result<Vec<u64>, MeshBulkError> {
    let size = comm.size();
    let me = comm.rank();
    if size == 1 {
        return Ok(vec![value]);
    }

    let payload = value.to_le_bytes();
    let mut recv_bufs: Vec<[u8; 8]> = vec![[0u8; 8]; size];
    let mut recv_handles = Vec::with_capacity(size - 1);
    for peer in 0..size {
        if peer != me {
            recv_handles.push((peer, comm.irecv(peer, tag, &mut recv_bufs[peer])));
        }
    }
    let mut send_handles = Vec::with_capacity(size - 1);
    for peer in 0..size {
        if peer != me {
            send_handles.push(comm.isend(peer, tag, &payload));
        }
    }
    for handle in send_handles {
        handle.wait();
    }

    let mut out = vec![0u64; size];
    out[me] = value;
    for (peer, handle) in recv_handles {
        let data = handle
            .wait()
            .ok_or(MeshBulkError::CollectiveExchangeFailed(peer))?;
        let mut word = [0u8; 8];
        word.copy_from_slice(&data[..8]);
        out[peer] = u64::from_le_bytes(word);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_comm_is_serial() {
        let comm = NoComm;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert_eq!(exchange_u64(&comm, 1, 17).unwrap(), vec![17]);
    }

    #[test]
    fn local_roundtrip_two_ranks() {
        let comm0 = LocalComm::new(0, 2);
        let comm1 = LocalComm::new(1, 2);

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        let send_handle = comm0.isend(1, 7, &[1, 2, 3, 4]);
        send_handle.wait();

        let data = recv_handle.wait().expect("expected data from rank 0");
        assert_eq!(&data, &[1, 2, 3, 4]);
    }

    #[test]
    fn exchange_u64_two_ranks() {
        let t0 = std::thread::spawn(|| exchange_u64(&LocalComm::new(0, 2), 11, 100).unwrap());
        let t1 = std::thread::spawn(|| exchange_u64(&LocalComm::new(1, 2), 11, 200).unwrap());
        assert_eq!(t0.join().unwrap(), vec![100, 200]);
        assert_eq!(t1.join().unwrap(), vec![100, 200]);
    }
}
