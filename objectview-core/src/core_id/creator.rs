//! Id creator
//!
//! One creator is built per process and shared by reference; the
//! sequence word makes ids from the same creator distinct.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of a generated id
pub const ID_LENGTH: usize = 27;

const CHARSET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz._";

/// Encode 160 bits, most significant character first
pub fn encode_id(bytes: &[u8; 20]) -> String {
    let mut out = [0u8; ID_LENGTH];
    let mut work: u32 = 0;
    let mut bits: i32 = 0;
    let mut pos = bytes.len();

    for slot in out.iter_mut().rev() {
        if bits < 6 && pos > 0 {
            pos -= 1;
            work |= u32::from(bytes[pos]) << bits;
            bits += 8;
        }
        *slot = CHARSET[(work & 0x3f) as usize];
        work >>= 6;
        bits -= 6;
    }

    out.iter().map(|&b| char::from(b)).collect()
}

/// Generator of compact unique ids
pub struct IdCreator {
    prefix: [u8; 16],
    sequence: AtomicU32,
}

impl IdCreator {
    /// Seed from random host/process words and the current time
    pub fn new() -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self::from_parts(rand::random(), now.as_secs() as u32, now.subsec_nanos(), rand::random())
    }

    /// Seed from explicit words
    pub fn from_parts(host: u32, secs: u32, nanos: u32, process: u32) -> Self {
        let mut prefix = [0u8; 16];
        prefix[0..4].copy_from_slice(&host.to_be_bytes());
        prefix[4..8].copy_from_slice(&secs.to_be_bytes());
        prefix[8..12].copy_from_slice(&nanos.to_be_bytes());
        prefix[12..16].copy_from_slice(&process.to_be_bytes());
        Self { prefix, sequence: AtomicU32::new(1) }
    }

    /// Next id; the sequence is advanced before use
    pub fn generate(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

        let mut bytes = [0u8; 20];
        bytes[..16].copy_from_slice(&self.prefix);
        bytes[16..].copy_from_slice(&sequence.to_be_bytes());
        encode_id(&bytes)
    }

    /// A new object id of the given type
    pub fn create_object(&self, type_name: &str) -> String {
        format!("{}:{}", self.generate(), type_name)
    }

    /// Last sequence number used
    pub fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Default for IdCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdCreator").field("sequence", &self.sequence()).finish()
    }
}
