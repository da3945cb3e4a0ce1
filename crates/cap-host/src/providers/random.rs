//! `random.bytes(ctx, length, personalization?) -> bytes`, a SHA3-256
//! counter-mode DRBG seeded from the syscall context plus an optional
//! beacon, so every provider-less chain still gets context-bound
//! randomness instead of reaching for OS entropy.

use crate::registry::Provider;
use async_trait::async_trait;
use cap_adapters::{BeaconAdapter, SyscallContext};
use cap_config::SecurityLimits;
use cap_enc::{domains, encode, sha3_256, u64be, Value};
use cap_errors::CapError;
use std::sync::Arc;

pub struct RandomBytesProvider {
    beacon: Option<Arc<dyn BeaconAdapter>>,
    limits: Arc<SecurityLimits>,
}

impl RandomBytesProvider {
    pub fn new(beacon: Option<Arc<dyn BeaconAdapter>>, limits: Arc<SecurityLimits>) -> Self {
        Self { beacon, limits }
    }
}

fn seed(
    chain_id: u64,
    height: u64,
    tx_hash: &[u8],
    caller: &[u8],
    personalization_canonical: &[u8],
    beacon_bytes: Option<&[u8]>,
) -> [u8; 32] {
    let mut buf = Vec::new();
    buf.extend_from_slice(domains::RAND);
    buf.extend_from_slice(&u64be(chain_id));
    buf.extend_from_slice(&u64be(height));
    buf.extend_from_slice(&(tx_hash.len() as u32).to_be_bytes());
    buf.extend_from_slice(tx_hash);
    buf.extend_from_slice(&(caller.len() as u32).to_be_bytes());
    buf.extend_from_slice(caller);
    buf.extend_from_slice(&(personalization_canonical.len() as u32).to_be_bytes());
    buf.extend_from_slice(personalization_canonical);
    if let Some(beacon) = beacon_bytes {
        buf.extend_from_slice(&(beacon.len() as u32).to_be_bytes());
        buf.extend_from_slice(beacon);
    }
    sha3_256(&buf)
}

fn expand(seed: &[u8; 32], length: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(length);
    let mut counter: u64 = 0;
    while out.len() < length {
        let mut buf = Vec::with_capacity(32 + 8 + 1);
        buf.extend_from_slice(seed);
        buf.extend_from_slice(&u64be(counter));
        buf.push(0x01);
        let block = sha3_256(&buf);
        let remaining = length - out.len();
        out.extend_from_slice(&block[..remaining.min(32)]);
        counter += 1;
    }
    out
}

#[async_trait]
impl Provider for RandomBytesProvider {
    async fn call(&self, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
        let length = kwargs
            .get("length")
            .and_then(Value::as_int)
            .ok_or_else(|| CapError::invalid_input("random.bytes: missing length"))?;
        if length <= 0 {
            return Err(CapError::invalid_input("random.bytes: length must be positive"));
        }
        let length = (length as u64).min(self.limits.max_random_bytes) as usize;

        let personalization = kwargs.get("personalization").cloned().unwrap_or(Value::Null);
        let personalization_canonical = encode(&personalization)?;

        let beacon_bytes = if let Some(beacon) = &self.beacon {
            Some(beacon.get_beacon_bytes(ctx.height).await?)
        } else {
            None
        };

        let seed = seed(
            ctx.chain_id,
            ctx.height,
            &ctx.tx_hash,
            &ctx.caller,
            &personalization_canonical,
            beacon_bytes.as_deref(),
        );
        let bytes = expand(&seed, length);

        Ok(Value::bytes(bytes))
    }
}
