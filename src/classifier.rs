use crate::types::Transfer;
use alloy_primitives::Address;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;

/// RiskLabel
///
/// Categories of known-bad counterparties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLabel {
    Hacker,
    Mixer,
    Scam,
}

impl Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLabel::Hacker => write!(f, "hacker"),
            RiskLabel::Mixer => write!(f, "mixer"),
            RiskLabel::Scam => write!(f, "scam"),
        }
    }
}

/// AddressClassifier
///
/// Maps an address to an optional risk label.
pub trait AddressClassifier {
    fn classify(&self, address: &Address) -> Option<RiskLabel>;
}

/// StaticClassifier
///
/// A classifier backed by fixed per-label address lists. The first label
/// an address is registered under wins; later registrations of the same
/// address are ignored.
#[derive(Debug, Default)]
pub struct StaticClassifier {
    labels: HashMap<Address, RiskLabel>,
}

impl StaticClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labelled(
        mut self,
        label: RiskLabel,
        addresses: impl IntoIterator<Item = Address>,
    ) -> Self {
        for address in addresses {
            self.labels.entry(address).or_insert(label);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl AddressClassifier for StaticClassifier {
    fn classify(&self, address: &Address) -> Option<RiskLabel> {
        self.labels.get(address).copied()
    }
}

/// FlaggedTransfer
///
/// A transfer that touched a labelled address, with the side that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedTransfer {
    pub label: RiskLabel,
    pub counterparty: Address,
    pub transfer: Transfer,
}

/// Flag every transfer whose sender or receiver carries a label. The
/// sender side is checked first; a transfer is flagged at most once.
pub fn screen_transfers(
    transfers: &[Transfer],
    classifier: &impl AddressClassifier,
) -> Vec<FlaggedTransfer> {
    let mut flagged = Vec::new();

    for transfer in transfers {
        let hit = classifier
            .classify(&transfer.sender)
            .map(|label| (label, transfer.sender))
            .or_else(|| {
                classifier
                    .classify(&transfer.receiver)
                    .map(|label| (label, transfer.receiver))
            });

        if let Some((label, counterparty)) = hit {
            flagged.push(FlaggedTransfer {
                label,
                counterparty,
                transfer: transfer.clone(),
            });
        }
    }

    flagged
}
