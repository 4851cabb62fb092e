//! Secret-sharing schemes
//!
//! The coordinator only needs two operations: split a buffer into exactly `n`
//! shares (one per registered store), and combine all `n` shares back. There
//! is no threshold: every share is required and any subset short of `n`
//! reveals nothing about the content.

use anyhow::{bail, Result};
use rand::RngCore;

/// Split/combine capability consumed by the coordinator.
pub trait ShareScheme: Send + Sync {
    /// Split `data` into exactly `n` shares. Share order is significant:
    /// share `i` goes to store `i`.
    fn split(&self, data: &[u8], n: usize) -> Result<Vec<Vec<u8>>>;

    /// Recombine a complete set of shares.
    fn combine(&self, shares: &[Vec<u8>]) -> Result<Vec<u8>>;
}

/// n-of-n XOR sharing.
///
/// Shares `0..n-1` are uniformly random pads and share `n-1` is the data
/// XORed with every pad. Each share is as long as the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorScheme;

impl ShareScheme for XorScheme {
    fn split(&self, data: &[u8], n: usize) -> Result<Vec<Vec<u8>>> {
        if n == 0 {
            bail!("cannot split into zero shares");
        }

        let mut rng = rand::thread_rng();
        let mut last = data.to_vec();
        let mut shares = Vec::with_capacity(n);
        for _ in 1..n {
            let mut pad = vec![0u8; data.len()];
            rng.fill_bytes(&mut pad);
            xor_into(&mut last, &pad);
            shares.push(pad);
        }
        shares.push(last);

        tracing::trace!(shares = n, bytes = data.len(), "split");
        Ok(shares)
    }

    fn combine(&self, shares: &[Vec<u8>]) -> Result<Vec<u8>> {
        let Some((first, rest)) = shares.split_first() else {
            bail!("no shares to combine");
        };

        let mut out = first.clone();
        for (i, share) in rest.iter().enumerate() {
            if share.len() != out.len() {
                bail!(
                    "share {} has length {}, expected {}",
                    i + 1,
                    share.len(),
                    out.len()
                );
            }
            xor_into(&mut out, share);
        }
        Ok(out)
    }
}

fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}
