use alloy_primitives::{
    Address,
    aliases::{TxHash, U256},
};
use serde::Serialize;
use std::fmt::{Debug, Display};

use crate::tracer::TraceError;

///
/// Transfer
///
/// A transfer is a single movement of value between two addresses.
///
/// Transfers come from a TransferSource and are never mutated here.
///
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub sender: Address,
    pub receiver: Address,
    pub amount: U256,
    pub tx_hash: TxHash,
    pub observed_at: u64,
}

impl Transfer {
    pub fn new(
        sender: Address,
        receiver: Address,
        amount: U256,
        tx_hash: TxHash,
        observed_at: u64,
    ) -> Self {
        Self {
            sender,
            receiver,
            amount,
            tx_hash,
            observed_at,
        }
    }
}

impl Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transfer {{ sender: {}, receiver: {}, amount: {}, tx_hash: {}, observed_at: {} }}",
            self.sender, self.receiver, self.amount, self.tx_hash, self.observed_at
        )
    }
}

impl Display for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} | {} | tx {}",
            self.sender, self.receiver, self.amount, self.tx_hash
        )
    }
}

///
/// Fraction
///
/// The minimum proportion of a hop's funding amount a transfer must carry
/// to count as a significant propagation of value. Valid range is (0, 1].
///
/// Stored as parts per million so threshold math stays in U256 integer
/// arithmetic instead of routing raw amounts through floats.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fraction(u32);

impl Fraction {
    const DENOM: u32 = 1_000_000;

    pub fn new(value: f64) -> Result<Self, TraceError> {
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            return Err(TraceError::InvalidConfig(format!(
                "min_fraction must be in (0, 1], got {value}"
            )));
        }
        let ppm = (value * Self::DENOM as f64).round() as u32;
        if ppm == 0 {
            return Err(TraceError::InvalidConfig(format!(
                "min_fraction {value} is smaller than 1/{}",
                Self::DENOM
            )));
        }
        Ok(Self(ppm.min(Self::DENOM)))
    }

    /// The amount a transfer out of a hop funded with `funding` must meet
    /// or exceed. Rounds down.
    pub fn threshold_of(&self, funding: U256) -> U256 {
        let num = U256::from(self.0);
        let den = U256::from(Self::DENOM);
        match funding.checked_mul(num) {
            Some(scaled) => scaled / den,
            // funding is within a factor of DENOM of U256::MAX; divide
            // first and accept the coarser rounding
            None => (funding / den) * num,
        }
    }
}

impl Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, Self::DENOM)
    }
}

///
/// Finding
///
/// One emitted record per transfer that cleared the threshold test at its
/// hop. `threshold` is the amount the transfer had to meet, derived from
/// the funding of the hop it was observed at.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub depth: usize,
    pub threshold: U256,
    pub transfer: Transfer,
}

impl Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} -> {} | {} | threshold {} | tx {}",
            self.depth,
            self.transfer.sender,
            self.transfer.receiver,
            self.transfer.amount,
            self.threshold,
            self.transfer.tx_hash
        )
    }
}
